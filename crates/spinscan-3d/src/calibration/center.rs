use glam::{DMat3, DVec3};

use super::CalibrationError;
use crate::plane::{Plane, PlaneError, UnitVector};

/// Default minimum angle in degrees between an upright plane normal and the axis.
pub const DEFAULT_MIN_UPRIGHT_ANGLE_DEG: f64 = 45.0;

/// Minimum sine of the angle between two upright normals to count them as non-parallel.
const PARALLEL_SINE_EPSILON: f64 = 1e-3;

/// One linear equation `n · c = rhs` of the center system, with unit `n`.
#[derive(Debug, Clone, Copy)]
struct Equation {
    normal: DVec3,
    rhs: f64,
}

impl Equation {
    fn from_plane(plane: &Plane) -> Self {
        let p = plane.normalized();
        Self {
            normal: DVec3::from_array(p.normal()),
            rhs: -p.d(),
        }
    }

    fn residual(&self, center: DVec3) -> f64 {
        self.normal.dot(center) - self.rhs
    }
}

/// The solution of the center of rotation system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterEstimate {
    /// The estimated center of rotation in the camera frame.
    pub center: [f64; 3],
    /// Number of equations in the system, anchor included.
    pub num_equations: usize,
    /// Root mean square of the equation residuals at the solution.
    pub rms_residual: f64,
}

/// Linear least-squares system for the center of rotation.
///
/// Every accepted upright plane contributes the equation `n · c + d = 0`, which
/// holds because the calibration target walls contain the rotation axis. A
/// single anchor equation pins the coordinate along the axis, either the
/// ground plane or `axis · c = 0`.
#[derive(Debug, Clone)]
pub struct CenterSolver {
    axis: UnitVector,
    min_axis_angle: f64,
    anchor: Equation,
    uprights: Vec<Equation>,
    num_rejected: usize,
}

impl CenterSolver {
    /// Create a solver anchored at `axis · c = 0`.
    pub fn new(axis: UnitVector) -> Self {
        Self {
            axis,
            min_axis_angle: DEFAULT_MIN_UPRIGHT_ANGLE_DEG.to_radians(),
            anchor: Equation {
                normal: axis.as_dvec3(),
                rhs: 0.0,
            },
            uprights: Vec::new(),
            num_rejected: 0,
        }
    }

    /// Create a solver anchored on the ground plane, so the center lies on the table surface.
    pub fn with_ground(axis: UnitVector, ground: &Plane) -> Self {
        Self {
            anchor: Equation::from_plane(ground),
            ..Self::new(axis)
        }
    }

    /// Set the minimum angle in degrees between an upright normal and the axis.
    pub fn with_min_upright_angle(mut self, degrees: f64) -> Self {
        self.min_axis_angle = degrees.to_radians();
        self
    }

    /// The rotation axis the system is built for.
    pub fn axis(&self) -> &UnitVector {
        &self.axis
    }

    /// Add an upright plane, returning whether it was accepted.
    ///
    /// Planes whose normal lies closer than the minimum angle to the axis are
    /// rejected, they do not constrain the center across the axis.
    pub fn add_upright(&mut self, plane: &Plane) -> Result<bool, PlaneError> {
        let cos = self.axis.dot(&plane.unit_normal()?.as_array()).abs();
        if cos > self.min_axis_angle.cos() {
            log::warn!(
                "Rejecting upright plane {:.4?}: {:.1} deg from the axis",
                plane.coefficients(),
                cos.min(1.0).acos().to_degrees()
            );
            self.num_rejected += 1;
            return Ok(false);
        }
        self.uprights.push(Equation::from_plane(plane));
        Ok(true)
    }

    /// Add several upright planes, returning how many were accepted.
    pub fn add_uprights(&mut self, planes: &[Plane]) -> Result<usize, PlaneError> {
        let mut accepted = 0;
        for plane in planes {
            if self.add_upright(plane)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Number of equations in the system, anchor included.
    pub fn num_equations(&self) -> usize {
        self.uprights.len() + 1
    }

    /// Number of accepted upright planes.
    pub fn num_uprights(&self) -> usize {
        self.uprights.len()
    }

    /// Number of rejected upright planes.
    pub fn num_rejected(&self) -> usize {
        self.num_rejected
    }

    fn has_two_directions(&self) -> bool {
        let Some(first) = self.uprights.first() else {
            return false;
        };
        self.uprights
            .iter()
            .any(|e| e.normal.cross(first.normal).length() > PARALLEL_SINE_EPSILON)
    }

    /// Solve the normal equations `AᵀA c = Aᵀb`.
    ///
    /// # Errors
    ///
    /// [`CalibrationError::InsufficientConstraints`] without two non-parallel
    /// accepted upright planes, or if the system is singular.
    pub fn solve(&self) -> Result<CenterEstimate, CalibrationError> {
        if !self.has_two_directions() {
            return Err(CalibrationError::InsufficientConstraints {
                accepted: self.uprights.len(),
            });
        }

        let equations = || std::iter::once(&self.anchor).chain(self.uprights.iter());

        let mut ata = DMat3::ZERO;
        let mut atb = DVec3::ZERO;
        for e in equations() {
            let n = e.normal;
            ata += DMat3::from_cols(n * n.x, n * n.y, n * n.z);
            atb += e.normal * e.rhs;
        }

        if ata.determinant().abs() < 1e-12 {
            return Err(CalibrationError::InsufficientConstraints {
                accepted: self.uprights.len(),
            });
        }

        let center = ata.inverse() * atb;
        let sum_sq = equations().map(|e| e.residual(center).powi(2)).sum::<f64>();
        let rms_residual = (sum_sq / self.num_equations() as f64).sqrt();

        Ok(CenterEstimate {
            center: center.to_array(),
            num_equations: self.num_equations(),
            rms_residual,
        })
    }
}

/// Estimate the center of rotation from upright calibration planes.
///
/// The along-axis coordinate is anchored at `axis · c = 0`. Use
/// [`CenterSolver::with_ground`] to anchor on the table surface instead.
///
/// # Errors
///
/// [`CalibrationError::InsufficientConstraints`] unless at least two
/// non-parallel upright planes are accepted.
pub fn estimate_center(
    axis: &UnitVector,
    upright_planes: &[Plane],
) -> Result<CenterEstimate, CalibrationError> {
    let mut solver = CenterSolver::new(*axis);
    solver.add_uprights(upright_planes)?;
    solver.solve()
}

/// Add further upright planes to an existing system and solve it again.
///
/// `solver` stands for both the axis and the initial center: it was built for
/// the axis and its current solution is the estimate being refined. The
/// equations already in it are kept. The shift of the center with respect to
/// the previous solution is logged.
///
/// # Errors
///
/// The errors of [`CenterSolver::solve`], or [`CalibrationError::InvalidPlane`]
/// if a plane has no usable normal.
pub fn refine_center(
    solver: &mut CenterSolver,
    additional: &[Plane],
) -> Result<CenterEstimate, CalibrationError> {
    let previous = solver.solve().ok();
    let accepted = solver.add_uprights(additional)?;
    let estimate = solver.solve()?;

    if let Some(previous) = previous {
        let shift = DVec3::from_array(estimate.center).distance(DVec3::from_array(previous.center));
        log::info!(
            "Refined center with {} new equations ({} total): shift {:.6}, rms residual {:.6}",
            accepted,
            estimate.num_equations,
            shift,
            estimate.rms_residual
        );
    }

    Ok(estimate)
}
