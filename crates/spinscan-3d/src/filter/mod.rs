//! Filters used to condition clouds before segmentation and registration.

mod crop;
pub use crop::crop;

mod voxel_grid;
pub use voxel_grid::{downsample, VoxelGrid};

use serde::{Deserialize, Serialize};

use crate::pointcloud::PointCloud;

/// Error types for the filter module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    /// The minimum bound is larger than the maximum bound on some axis.
    #[error("Invalid crop bounds on axis {axis}: min {min} > max {max}")]
    InvalidBounds {
        /// The offending axis, 0 = x, 1 = y, 2 = z.
        axis: usize,
        /// The lower bound.
        min: f64,
        /// The upper bound.
        max: f64,
    },

    /// The voxel leaf size is not strictly positive and finite.
    #[error("Voxel leaf size must be positive and finite, got {0}")]
    InvalidLeafSize(f64),

    /// The input cloud has no points.
    #[error("Input point cloud is empty")]
    EmptyCloud,
}

/// Parameters of the cloud conditioning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Lower corner of the crop box.
    pub crop_min: [f64; 3],
    /// Upper corner of the crop box.
    pub crop_max: [f64; 3],
    /// Edge of the downsampling voxels. `None` disables downsampling.
    pub leaf_size: Option<f64>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            crop_min: [-0.15, -100.0, -100.0],
            crop_max: [0.15, 0.08, 0.5],
            leaf_size: Some(0.01),
        }
    }
}

/// Crop, drop invalid points and optionally downsample a raw capture.
///
/// The output is always unorganized and never empty.
///
/// # Errors
///
/// [`FilterError::EmptyCloud`] if the capture holds no valid point or none is
/// left inside the crop box, plus the errors of [`crop`] and [`downsample`].
pub fn condition(cloud: &PointCloud, params: &FilterParams) -> Result<PointCloud, FilterError> {
    let cropped = crop(cloud, &params.crop_min, &params.crop_max)?;
    let filtered = match params.leaf_size {
        Some(leaf_size) => downsample(&cropped, leaf_size)?,
        None => remove_invalid(&cropped),
    };
    if filtered.is_empty() {
        return Err(FilterError::EmptyCloud);
    }
    log::info!(
        "Point cloud before filtering: {} points, after filtering: {} points",
        cloud.len(),
        filtered.len()
    );
    Ok(filtered)
}

/// Remove the invalid (NaN) points of a cloud, producing an unorganized cloud.
pub fn remove_invalid(cloud: &PointCloud) -> PointCloud {
    PointCloud::new(cloud.valid_points().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::INVALID_POINT;

    #[test]
    fn test_remove_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let cloud =
            PointCloud::new_organized(vec![[0.0; 3], INVALID_POINT, [1.0; 3], INVALID_POINT], 2, 2)?;
        let clean = remove_invalid(&cloud);
        assert!(!clean.is_organized());
        assert_eq!(clean.points(), &[[0.0; 3], [1.0; 3]]);
        Ok(())
    }

    #[test]
    fn test_condition() -> Result<(), Box<dyn std::error::Error>> {
        let cloud = PointCloud::new_organized(
            vec![
                [0.0, 0.0, 0.2],
                [0.001, 0.0, 0.2],
                [1.0, 0.0, 0.2],
                INVALID_POINT,
            ],
            2,
            2,
        )?;
        let params = FilterParams::default();
        let out = condition(&cloud, &params)?;
        assert_eq!(out.len(), 1);

        let no_downsample = FilterParams {
            leaf_size: None,
            ..FilterParams::default()
        };
        assert_eq!(condition(&cloud, &no_downsample)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_condition_without_valid_points() -> Result<(), Box<dyn std::error::Error>> {
        let all_invalid = PointCloud::new_organized(vec![INVALID_POINT; 4], 2, 2)?;
        let outside = PointCloud::new(vec![[1.0, 0.0, 0.2], [0.0, 0.0, 3.0]]);
        let no_downsample = FilterParams {
            leaf_size: None,
            ..FilterParams::default()
        };
        for params in [FilterParams::default(), no_downsample] {
            assert_eq!(condition(&all_invalid, &params), Err(FilterError::EmptyCloud));
            assert_eq!(condition(&outside, &params), Err(FilterError::EmptyCloud));
        }
        Ok(())
    }
}
