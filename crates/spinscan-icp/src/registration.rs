use serde::{Deserialize, Serialize};

use crate::{icp_vanilla, ICPConvergenceCriteria, IcpError};
use spinscan_3d::{
    filter::{self, FilterError},
    pointcloud::PointCloud,
    transforms::{RigidTransform, TransformError},
};

/// Error types for the registration module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistrationError {
    /// The scan set has no view.
    #[error("Scan set is empty")]
    EmptyScanSet,

    /// The scan set was created with zero steps per revolution.
    #[error("Number of steps per revolution must be positive")]
    ZeroSteps,

    /// A view has no valid point.
    #[error("View {0} has no valid point")]
    EmptyView(usize),

    /// A view index is not below the number of steps.
    #[error("Angle index {index} out of range for {num_steps} steps")]
    AngleIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of steps per revolution.
        num_steps: usize,
    },

    /// Two views share the same angle index.
    #[error("Duplicate angle index {0}")]
    DuplicateIndex(usize),

    /// Downsampling for ICP failed.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// A view could not be transformed.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Direction in which the turntable turns, seen from above (+Z).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    /// The object turns clockwise, so later views are rotated counter-clockwise into the model.
    #[default]
    Clockwise,
    /// The object turns counter-clockwise, so later views are rotated clockwise into the model.
    CounterClockwise,
}

impl RotationDirection {
    /// Sign of the yaw that brings a later view back onto the first one.
    pub fn alignment_sign(&self) -> f64 {
        match self {
            RotationDirection::Clockwise => 1.0,
            RotationDirection::CounterClockwise => -1.0,
        }
    }
}

/// Parameters of the multi-view registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    /// ICP convergence criteria.
    pub icp: ICPConvergenceCriteria,
    /// Mean correspondence distance above which an ICP refinement is rejected.
    pub rejection_distance: f64,
    /// Direction of the table rotation.
    pub direction: RotationDirection,
    /// Voxel size used to thin the ICP inputs. `None` uses every point.
    pub icp_leaf_size: Option<f64>,
    /// Voxel size used to thin the merged model. `None` keeps every point.
    pub merge_leaf_size: Option<f64>,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            icp: ICPConvergenceCriteria::default(),
            rejection_distance: 0.05,
            direction: RotationDirection::default(),
            icp_leaf_size: None,
            merge_leaf_size: None,
        }
    }
}

/// The views of one turntable revolution.
///
/// View `i` was captured after the table turned by `i * 360 / num_steps` degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSet {
    num_steps: usize,
    views: Vec<(usize, PointCloud)>,
}

impl ScanSet {
    /// Create an empty scan set for a revolution of `num_steps` steps.
    pub fn new(num_steps: usize) -> Self {
        Self {
            num_steps,
            views: Vec::new(),
        }
    }

    /// Add the cloud captured at step `angle_index`.
    pub fn push(&mut self, angle_index: usize, cloud: PointCloud) {
        self.views.push((angle_index, cloud));
    }

    /// Number of steps per revolution.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// The table rotation between two steps, in degrees.
    pub fn step_degrees(&self) -> f64 {
        360.0 / self.num_steps as f64
    }

    /// The views as `(angle_index, cloud)` pairs, in insertion order.
    pub fn views(&self) -> &[(usize, PointCloud)] {
        &self.views
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether the set holds no view.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Apply a fallible operation to every cloud, keeping the angle indices.
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(&PointCloud) -> Result<PointCloud, E>,
    ) -> Result<ScanSet, E> {
        let views = self
            .views
            .iter()
            .map(|(index, cloud)| Ok((*index, f(cloud)?)))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(ScanSet {
            num_steps: self.num_steps,
            views,
        })
    }

    fn validate(&self) -> Result<(), RegistrationError> {
        if self.num_steps == 0 {
            return Err(RegistrationError::ZeroSteps);
        }
        if self.views.is_empty() {
            return Err(RegistrationError::EmptyScanSet);
        }
        let mut seen = vec![false; self.num_steps];
        for (index, cloud) in &self.views {
            let slot = seen
                .get_mut(*index)
                .ok_or(RegistrationError::AngleIndexOutOfRange {
                    index: *index,
                    num_steps: self.num_steps,
                })?;
            if *slot {
                return Err(RegistrationError::DuplicateIndex(*index));
            }
            *slot = true;
            if cloud.num_valid() == 0 {
                return Err(RegistrationError::EmptyView(*index));
            }
        }
        Ok(())
    }
}

/// A non-fatal registration issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlignmentWarning {
    /// ICP did not produce an acceptable refinement, the nominal rotation was used.
    AlignmentDegraded {
        /// Angle index of the view.
        angle_index: usize,
        /// Why the refinement was rejected.
        reason: String,
    },
}

/// How one view was placed in the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredView {
    /// Angle index of the view.
    pub angle_index: usize,
    /// Transform from the view to the model frame.
    pub transform: RigidTransform,
    /// Nominal yaw of the view in degrees.
    pub nominal_yaw_deg: f64,
    /// Yaw of the applied transform in degrees, in `(-180, 180]`.
    pub refined_yaw_deg: f64,
    /// ICP iterations spent on the view, 0 for the seed view.
    pub icp_iterations: usize,
    /// Final ICP mean correspondence distance, if ICP ran.
    pub mean_distance: Option<f64>,
    /// Whether the nominal rotation was used instead of ICP.
    pub degraded: bool,
    /// Number of points the view contributed to the model.
    pub num_points: usize,
}

/// The merged model of a revolution, in the world frame.
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    /// The merged unorganized cloud.
    pub cloud: PointCloud,
    /// Per-view alignment records, sorted by angle index.
    pub views: Vec<RegisteredView>,
    /// Views whose alignment fell back to the nominal rotation.
    pub warnings: Vec<AlignmentWarning>,
    /// Number of steps per revolution.
    pub num_steps: usize,
}

impl RegisteredModel {
    /// Refined table rotation between consecutive views, in degrees.
    ///
    /// One increment per view: from each view to the next one, the last one
    /// closing the circle back to the first view. Each increment is the nominal
    /// step plus the refined deviation wrapped to `(-180, 180]`, so for a full
    /// revolution they add up to 360 degrees.
    pub fn angular_increments(&self) -> Vec<f64> {
        let n = self.views.len();
        if n == 0 || self.num_steps == 0 {
            return Vec::new();
        }
        let step = 360.0 / self.num_steps as f64;
        // sign of the nominal yaw progression
        let sign = match self.views.iter().find(|v| v.angle_index > 0) {
            Some(v) if v.nominal_yaw_deg < 0.0 => -1.0,
            _ => 1.0,
        };

        (0..n)
            .map(|k| {
                let a = &self.views[k];
                let b = &self.views[(k + 1) % n];
                let mut steps = b.angle_index as f64 - a.angle_index as f64;
                if k + 1 == n {
                    steps += self.num_steps as f64;
                }
                let nominal = sign * steps * step;
                nominal + wrap_degrees(b.refined_yaw_deg - a.refined_yaw_deg - nominal)
            })
            .collect()
    }

    /// Whether any view fell back to its nominal rotation.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Wrap an angle in degrees to `(-180, 180]`.
fn wrap_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a > 180.0 {
        a - 360.0
    } else {
        a
    }
}

/// Aligns and merges the views of a turntable revolution.
///
/// Views are placed in angle index order. The first one seeds the model at its
/// nominal rotation. Every following view starts from its nominal rotation
/// about +Z and is refined with ICP against the model accumulated so far.
#[derive(Debug, Clone, Default)]
pub struct MultiViewRegistrar {
    params: RegistrationParams,
}

impl MultiViewRegistrar {
    /// Create a registrar with the given parameters.
    pub fn new(params: RegistrationParams) -> Self {
        Self { params }
    }

    /// The registration parameters.
    pub fn params(&self) -> &RegistrationParams {
        &self.params
    }

    fn nominal_yaw_deg(&self, angle_index: usize, step_degrees: f64) -> f64 {
        self.params.direction.alignment_sign() * angle_index as f64 * step_degrees
    }

    fn thin(&self, cloud: &PointCloud, leaf_size: Option<f64>) -> Result<PointCloud, FilterError> {
        match leaf_size {
            Some(leaf_size) => filter::downsample(cloud, leaf_size),
            None => Ok(filter::remove_invalid(cloud)),
        }
    }

    /// Refine the nominal transform of a view against the model.
    ///
    /// Returns the ICP result, or the reason it was rejected.
    fn refine(
        &self,
        view: &PointCloud,
        model: &PointCloud,
        coarse: &RigidTransform,
    ) -> Result<Result<crate::ICPResult, String>, RegistrationError> {
        let source = self.thin(view, self.params.icp_leaf_size)?;
        let target = self.thin(model, self.params.icp_leaf_size)?;

        let result = match icp_vanilla(&source, &target, coarse, &self.params.icp) {
            Ok(result) => result,
            Err(IcpError::Transform(e)) => return Err(e.into()),
            Err(e) => return Ok(Err(e.to_string())),
        };

        if !result.converged {
            return Ok(Err(format!(
                "ICP did not converge in {} iterations",
                result.num_iterations
            )));
        }
        if result.mean_distance > self.params.rejection_distance {
            return Ok(Err(format!(
                "ICP mean distance {:.6} above {}",
                result.mean_distance, self.params.rejection_distance
            )));
        }
        Ok(Ok(result))
    }

    /// Register and merge all views of a scan set.
    ///
    /// # Errors
    ///
    /// Fails on an empty set, zero steps, out-of-range or duplicate angle
    /// indices and views without valid points. A rejected ICP refinement is
    /// not an error, it is reported in [`RegisteredModel::warnings`].
    pub fn register(&self, scans: &ScanSet) -> Result<RegisteredModel, RegistrationError> {
        scans.validate()?;

        let mut views = scans.views().iter().collect::<Vec<_>>();
        views.sort_by_key(|(index, _)| *index);

        let step = scans.step_degrees();
        let mut model = PointCloud::new(Vec::new());
        let mut records = Vec::with_capacity(views.len());
        let mut warnings = Vec::new();

        for (k, (angle_index, cloud)) in views.into_iter().enumerate() {
            let nominal_yaw_deg = self.nominal_yaw_deg(*angle_index, step);
            let coarse = RigidTransform::from_yaw(nominal_yaw_deg.to_radians());

            let (transform, icp_iterations, mean_distance, degraded) = if k == 0 {
                (coarse, 0, None, false)
            } else {
                match self.refine(cloud, &model, &coarse)? {
                    Ok(result) => (
                        result.transform,
                        result.num_iterations,
                        Some(result.mean_distance),
                        false,
                    ),
                    Err(reason) => {
                        log::warn!(
                            "View {}: alignment degraded, using nominal rotation: {}",
                            angle_index,
                            reason
                        );
                        warnings.push(AlignmentWarning::AlignmentDegraded {
                            angle_index: *angle_index,
                            reason,
                        });
                        (coarse, 0, None, true)
                    }
                }
            };

            let aligned = transform.apply(cloud)?;
            let num_points = aligned.num_valid();
            model = model.concatenate(&aligned);

            let record = RegisteredView {
                angle_index: *angle_index,
                transform,
                nominal_yaw_deg,
                refined_yaw_deg: transform.yaw().to_degrees(),
                icp_iterations,
                mean_distance,
                degraded,
                num_points,
            };

            log::info!(
                "View {}: nominal yaw {:.2}, refined yaw {:.2}, {} ICP iterations, {} points, model {} points",
                record.angle_index,
                record.nominal_yaw_deg,
                record.refined_yaw_deg,
                record.icp_iterations,
                record.num_points,
                model.len()
            );
            records.push(record);
        }

        if let Some(leaf_size) = self.params.merge_leaf_size {
            let before = model.len();
            model = filter::downsample(&model, leaf_size)?;
            log::info!("Merged model downsampled from {} to {} points", before, model.len());
        }

        Ok(RegisteredModel {
            cloud: model,
            views: records,
            warnings,
            num_steps: scans.num_steps(),
        })
    }
}

/// Register and merge all views of a scan set with the given parameters.
///
/// See [`MultiViewRegistrar::register`].
pub fn register_views(
    scans: &ScanSet,
    params: &RegistrationParams,
) -> Result<RegisteredModel, RegistrationError> {
    MultiViewRegistrar::new(params.clone()).register(scans)
}
