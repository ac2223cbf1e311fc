use super::FilterError;
use crate::pointcloud::{is_valid_point, PointCloud, INVALID_POINT};
use crate::transforms::with_layout_of;

/// Keep the points inside the axis-aligned box `[bounds_min, bounds_max]`.
///
/// The box is inclusive on every axis. For an organized cloud the points
/// outside the box are replaced by NaN so the `width x height` layout is kept;
/// for an unorganized cloud they are dropped.
///
/// # Arguments
///
/// * `cloud` - The cloud to crop.
/// * `bounds_min` - The lower corner of the box.
/// * `bounds_max` - The upper corner of the box.
///
/// # Errors
///
/// * [`FilterError::InvalidBounds`] if `bounds_min[i] > bounds_max[i]` for any axis.
/// * [`FilterError::EmptyCloud`] if the input cloud has no valid point.
pub fn crop(
    cloud: &PointCloud,
    bounds_min: &[f64; 3],
    bounds_max: &[f64; 3],
) -> Result<PointCloud, FilterError> {
    for axis in 0..3 {
        // also rejects NaN bounds
        if !(bounds_min[axis] <= bounds_max[axis]) {
            return Err(FilterError::InvalidBounds {
                axis,
                min: bounds_min[axis],
                max: bounds_max[axis],
            });
        }
    }

    if cloud.num_valid() == 0 {
        return Err(FilterError::EmptyCloud);
    }

    let inside = |p: &[f64; 3]| {
        is_valid_point(p) && (0..3).all(|i| p[i] >= bounds_min[i] && p[i] <= bounds_max[i])
    };

    let cropped = if cloud.is_organized() {
        let points = cloud
            .points()
            .iter()
            .map(|p| if inside(p) { *p } else { INVALID_POINT })
            .collect();
        with_layout_of(cloud, points)
    } else {
        PointCloud::new(cloud.points().iter().filter(|p| inside(p)).copied().collect())
    };

    log::debug!(
        "Cropped cloud to {} valid points out of {}",
        cropped.num_valid(),
        cloud.len()
    );

    Ok(cropped)
}
