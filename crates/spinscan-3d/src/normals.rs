use std::num::NonZero;

use kiddo::immutable::float::kdtree::ImmutableKdTree;

use crate::linalg::least_variance_direction;
use crate::pointcloud::{is_valid_point, PointCloud, INVALID_POINT};

/// Smallest neighborhood that defines a plane.
pub const MIN_NEIGHBORS: usize = 3;

/// Error types for the normals module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NormalError {
    /// The neighborhood is too small to fit a plane.
    #[error("Number of neighbors must be at least {MIN_NEIGHBORS}, got {0}")]
    InvalidNeighbors(usize),

    /// The cloud has fewer valid points than a neighborhood needs.
    #[error("Not enough valid points to estimate normals: {0}")]
    NotEnoughPoints(usize),
}

/// Estimate the surface normal at every point of a cloud.
///
/// The normal of a point is the direction of least variance of its
/// `num_neighbors` nearest valid neighbors, the point itself included. It is
/// oriented towards `viewpoint`, usually the camera center. The output follows
/// the layout of `cloud`: invalid points get a NaN normal.
///
/// # Arguments
///
/// * `cloud` - The cloud to estimate normals for.
/// * `num_neighbors` - Size of the neighborhood, capped to the number of valid points.
/// * `viewpoint` - The point normals are flipped towards.
///
/// # Errors
///
/// * [`NormalError::InvalidNeighbors`] if `num_neighbors < 3`.
/// * [`NormalError::NotEnoughPoints`] if the cloud has fewer than 3 valid points.
pub fn estimate_normals(
    cloud: &PointCloud,
    num_neighbors: usize,
    viewpoint: &[f64; 3],
) -> Result<Vec<[f64; 3]>, NormalError> {
    if num_neighbors < MIN_NEIGHBORS {
        return Err(NormalError::InvalidNeighbors(num_neighbors));
    }

    let valid = cloud.valid_points().copied().collect::<Vec<_>>();
    if valid.len() < MIN_NEIGHBORS {
        return Err(NormalError::NotEnoughPoints(valid.len()));
    }

    let max_qty = NonZero::new(num_neighbors.min(valid.len()))
        .ok_or(NormalError::InvalidNeighbors(num_neighbors))?;
    let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(&valid);

    let normals = cloud
        .points()
        .iter()
        .map(|p| {
            if !is_valid_point(p) {
                return INVALID_POINT;
            }
            let neighbors = kdtree
                .nearest_n::<kiddo::SquaredEuclidean>(p, max_qty)
                .into_iter()
                .map(|nn| valid[nn.item as usize])
                .collect::<Vec<_>>();
            match least_variance_direction(neighbors.iter()) {
                Some((_, n)) => orient_towards(n, p, viewpoint),
                None => INVALID_POINT,
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "Estimated {} normals with {} neighbors",
        valid.len(),
        max_qty
    );

    Ok(normals)
}

fn orient_towards(n: [f64; 3], p: &[f64; 3], viewpoint: &[f64; 3]) -> [f64; 3] {
    let to_view = [viewpoint[0] - p[0], viewpoint[1] - p[1], viewpoint[2] - p[2]];
    if n[0] * to_view[0] + n[1] * to_view[1] + n[2] * to_view[2] < 0.0 {
        [-n[0], -n[1], -n[2]]
    } else {
        n
    }
}
