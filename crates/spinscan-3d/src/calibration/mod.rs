//! Turntable calibration.
//!
//! The rotation axis is the mean normal of the table surface observed in the
//! calibration captures. The center of rotation is the least-squares point
//! shared by the upright walls of the calibration target. Together they define
//! the world frame: the axis becomes +Z and the center becomes the origin.

mod axis;
pub use axis::{estimate_axis, estimate_axis_with_hint, AXIS_EPSILON, DEFAULT_UP_HINT};

mod center;
pub use center::{
    estimate_center, refine_center, CenterEstimate, CenterSolver, DEFAULT_MIN_UPRIGHT_ANGLE_DEG,
};

use serde::{Deserialize, Serialize};

use crate::plane::{Plane, PlaneError, UnitVector};
use crate::pointcloud::PointCloud;
use crate::segmentation::PlaneSegmentationParams;
use crate::transforms::{rotation_between, RigidTransform, TransformError};

/// Error types for the calibration module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibrationError {
    /// The ground normals do not define a direction.
    #[error("Cannot estimate the rotation axis: no ground plane or the normals cancel out")]
    DegenerateAxis,

    /// Not enough non-parallel upright planes to locate the center.
    #[error("Not enough constraints to estimate the center: {accepted} upright planes accepted, at least 2 non-parallel needed")]
    InsufficientConstraints {
        /// Number of upright planes accepted into the system.
        accepted: usize,
    },

    /// A plane or direction could not be built.
    #[error(transparent)]
    InvalidPlane(#[from] PlaneError),
}

/// The turntable rotation axis in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationAxis {
    /// Unit direction of the axis, pointing up.
    pub direction: UnitVector,
    /// A point on the axis, the center of rotation on the table surface.
    pub center: [f64; 3],
}

/// Build the camera to world transform of a rotation axis.
///
/// The rotation is the minimal one taking the axis direction to +Z and the
/// translation is `-R * center`, so that `p' = R (p - center)`.
pub fn build_transform(axis: &RotationAxis) -> RigidTransform {
    let rotation = rotation_between(&axis.direction, &UnitVector::Z);
    let rc = crate::linalg::matvec33(&rotation, &axis.center);
    RigidTransform::new(rotation, [-rc[0], -rc[1], -rc[2]])
}

/// A turntable calibration, reusable across scan sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// The estimated rotation axis.
    pub axis: RotationAxis,
    /// The camera to world transform.
    pub transform: RigidTransform,
    /// Number of equations used to locate the center.
    pub num_equations: usize,
    /// Root mean square residual of the center system.
    pub rms_residual: f64,
}

impl CalibrationResult {
    /// Create a calibration from an axis and the center system diagnostics.
    pub fn new(axis: RotationAxis, num_equations: usize, rms_residual: f64) -> Self {
        Self {
            transform: build_transform(&axis),
            axis,
            num_equations,
            rms_residual,
        }
    }

    /// Bring a camera frame cloud into the world frame.
    ///
    /// Invalid points pass through unchanged and the layout is preserved. A
    /// cloud without any valid point fails with [`TransformError::EmptyCloud`].
    pub fn apply(&self, cloud: &PointCloud) -> Result<PointCloud, TransformError> {
        self.transform.apply(cloud)
    }
}

/// Parameters of the calibration stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Rough "up" direction in the camera frame, fixes the sign of the axis.
    pub up_hint: [f64; 3],
    /// Minimum angle in degrees between an upright plane normal and the axis.
    pub min_upright_angle_deg: f64,
    /// Anchor the center on the ground plane instead of `axis · c = 0`.
    pub anchor_to_ground: bool,
    /// Plane extraction used on the calibration captures.
    pub segmentation: PlaneSegmentationParams,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            up_hint: DEFAULT_UP_HINT,
            min_upright_angle_deg: DEFAULT_MIN_UPRIGHT_ANGLE_DEG,
            anchor_to_ground: true,
            segmentation: PlaneSegmentationParams::default(),
        }
    }
}

/// Calibrate the turntable from the planes extracted in each calibration capture.
///
/// The first plane of every capture is the ground, the largest plane in view.
/// The remaining planes are candidate upright walls of the target.
///
/// # Arguments
///
/// * `captures` - Planes of each capture, largest first.
/// * `params` - The calibration parameters.
pub fn calibrate_from_planes(
    captures: &[Vec<Plane>],
    params: &CalibrationParams,
) -> Result<CalibrationResult, CalibrationError> {
    let grounds = captures
        .iter()
        .filter_map(|planes| planes.first().copied())
        .collect::<Vec<_>>();

    let direction = estimate_axis_with_hint(&grounds, &params.up_hint)?;

    let mut solver = match grounds.first() {
        Some(ground) if params.anchor_to_ground => CenterSolver::with_ground(direction, ground),
        _ => CenterSolver::new(direction),
    }
    .with_min_upright_angle(params.min_upright_angle_deg);

    for planes in captures {
        if let Some(uprights) = planes.get(1..) {
            solver.add_uprights(uprights)?;
        }
    }

    let estimate = solver.solve()?;

    log::info!(
        "Calibration: axis {:?}, center {:?} from {} equations ({} uprights rejected), rms residual {:.6}",
        direction.as_array(),
        estimate.center,
        estimate.num_equations,
        solver.num_rejected(),
        estimate.rms_residual
    );

    Ok(CalibrationResult::new(
        RotationAxis {
            direction,
            center: estimate.center,
        },
        estimate.num_equations,
        estimate.rms_residual,
    ))
}
