use kiddo::immutable::float::kdtree::ImmutableKdTree;
use serde::{Deserialize, Serialize};

use crate::ops::{find_correspondences, fit_transformation, update_transformation};
use spinscan_3d::{
    linalg::transform_points,
    pointcloud::PointCloud,
    transforms::{RigidTransform, TransformError},
};

/// Error types for the ICP module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IcpError {
    /// The source cloud has no valid point.
    #[error("ICP source point cloud is empty")]
    EmptySource,

    /// The target cloud has no valid point.
    #[error("ICP target point cloud is empty")]
    EmptyTarget,

    /// Too few correspondences to fit a rigid transform.
    #[error("Need at least 3 correspondences to fit a rigid transform, got {0}")]
    NotEnoughCorrespondences(usize),

    /// The source points could not be transformed.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Result of the ICP algorithm.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone)]
pub struct ICPResult {
    /// Estimated source to target transform.
    pub transform: RigidTransform,
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Mean distance between corresponding points in the last iteration.
    pub mean_distance: f64,
    /// Last computed RMSE.
    pub rmse: f64,
    /// Whether the change of the mean distance fell below the tolerance.
    pub converged: bool,
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ICPConvergenceCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance on the change of the mean correspondence distance between two iterations.
    pub tolerance: f64,
}

impl Default for ICPConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-6,
        }
    }
}

/// Iterative Closest Point (ICP) algorithm using point to point distance.
///
/// Invalid points of either cloud are ignored.
///
/// # Arguments
///
/// * `source` - Source point cloud.
/// * `target` - Target point cloud.
/// * `initial` - Initial source to target transform.
/// * `criteria` - Convergence criteria.
///
/// # Returns
///
/// The refined transform with the iteration count and the final errors. Hitting
/// the iteration cap is not an error, check [`ICPResult::converged`].
pub fn icp_vanilla(
    source: &PointCloud,
    target: &PointCloud,
    initial: &RigidTransform,
    criteria: &ICPConvergenceCriteria,
) -> Result<ICPResult, IcpError> {
    let source_points = source.valid_points().copied().collect::<Vec<_>>();
    let target_points = target.valid_points().copied().collect::<Vec<_>>();
    if source_points.is_empty() {
        return Err(IcpError::EmptySource);
    }
    if target_points.is_empty() {
        return Err(IcpError::EmptyTarget);
    }

    // initialize the result structure with the initial transformation given by the user
    let mut result = ICPResult {
        transform: *initial,
        num_iterations: 0,
        mean_distance: f64::INFINITY,
        rmse: f64::INFINITY,
        converged: false,
    };

    // build kdtree for target points to speed up the nearest neighbor search
    let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(&target_points);

    // perform transformation using the initial rotation and translation
    let mut current_source = vec![[0.0; 3]; source_points.len()];
    transform_points(
        &source_points,
        &initial.rotation,
        &initial.translation,
        &mut current_source,
    )
    .map_err(TransformError::from)?;

    // main icp loop
    for i in 0..criteria.max_iterations {
        // find closest points between current source and target
        let corr = find_correspondences(&current_source, &target_points, &kdtree);

        log::debug!(
            "Iteration {}: {} correspondences out of {} points",
            i,
            corr.points_in_src.len(),
            current_source.len()
        );

        // compute transformation between current source and closest points
        let delta = fit_transformation(&corr.points_in_src, &corr.points_in_dst)?;

        // transform current source using the computed transformation
        let mut transformed_points = vec![[0.0; 3]; current_source.len()];
        transform_points(
            &current_source,
            &delta.rotation,
            &delta.translation,
            &mut transformed_points,
        )
        .map_err(TransformError::from)?;
        current_source = transformed_points;

        // update the output transformation as
        // R_new = R_delta * R_old
        // t_new = R_delta * t_old + t_delta
        update_transformation(&mut result.transform, &delta);

        // compute errors between matched points
        let num_matches = corr.sq_distances.len() as f64;
        let mean_distance = corr.sq_distances.iter().map(|d| d.sqrt()).sum::<f64>() / num_matches;
        let rmse = (corr.sq_distances.iter().sum::<f64>() / num_matches).sqrt();

        result.num_iterations += 1;

        // check convergence and exit if below tolerance
        let change = (result.mean_distance - mean_distance).abs();
        result.mean_distance = mean_distance;
        result.rmse = rmse;

        if change < criteria.tolerance {
            log::debug!(
                "ICP converged in {} iterations with mean distance {}",
                result.num_iterations,
                mean_distance
            );
            result.converged = true;
            break;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use spinscan_3d::{pointcloud::INVALID_POINT, transforms::axis_angle_to_rotation_matrix};

    fn random_cloud(num_points: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| {
                [
                    rng.random_range(0.0..0.3),
                    rng.random_range(0.0..0.2),
                    rng.random_range(0.0..0.1),
                ]
            })
            .collect()
    }

    #[test]
    fn test_icp_vanilla() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(0);
        let points_src = random_cloud(500, &mut rng);

        let dst_t_src = RigidTransform::new(
            axis_angle_to_rotation_matrix(&[0.2, 0.1, 1.0], 0.01)?,
            [0.001, -0.0005, 0.0005],
        );
        let points_dst = points_src
            .iter()
            .map(|p| dst_t_src.apply_point(p))
            .collect::<Vec<_>>();

        let result = icp_vanilla(
            &PointCloud::new(points_src),
            &PointCloud::new(points_dst),
            &RigidTransform::identity(),
            &ICPConvergenceCriteria::default(),
        )?;

        assert!(result.converged);
        assert!(result.mean_distance < 1e-6);
        for i in 0..3 {
            assert_relative_eq!(
                result.transform.translation[i],
                dst_t_src.translation[i],
                epsilon = 1e-6
            );
            for j in 0..3 {
                assert_relative_eq!(
                    result.transform.rotation[i][j],
                    dst_t_src.rotation[i][j],
                    epsilon = 1e-6
                );
            }
        }
        Ok(())
    }

    #[test]
    fn test_icp_keeps_exact_initial_guess() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(1);
        let points_src = random_cloud(200, &mut rng);
        let dst_t_src = RigidTransform::from_yaw(1.2);
        let mut points_dst = points_src
            .iter()
            .map(|p| dst_t_src.apply_point(p))
            .collect::<Vec<_>>();
        points_dst.push(INVALID_POINT);

        let result = icp_vanilla(
            &PointCloud::new(points_src),
            &PointCloud::new(points_dst),
            &dst_t_src,
            &ICPConvergenceCriteria::default(),
        )?;
        assert!(result.converged);
        assert_relative_eq!(result.transform.yaw(), 1.2, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_icp_iteration_cap() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(2);
        let points = random_cloud(100, &mut rng);
        let shifted = points.iter().map(|p| [p[0] + 0.01, p[1], p[2]]).collect();

        let result = icp_vanilla(
            &PointCloud::new(points),
            &PointCloud::new(shifted),
            &RigidTransform::identity(),
            &ICPConvergenceCriteria {
                max_iterations: 1,
                tolerance: 1e-6,
            },
        )?;
        // a single iteration has no previous error to compare with
        assert!(!result.converged);
        assert_eq!(result.num_iterations, 1);
        Ok(())
    }

    #[test]
    fn test_icp_empty_clouds() {
        let cloud = PointCloud::new(vec![[0.0; 3]; 3]);
        let empty = PointCloud::new(vec![INVALID_POINT]);
        let criteria = ICPConvergenceCriteria::default();
        let identity = RigidTransform::identity();
        assert_eq!(
            icp_vanilla(&empty, &cloud, &identity, &criteria).err(),
            Some(IcpError::EmptySource)
        );
        assert_eq!(
            icp_vanilla(&cloud, &empty, &identity, &criteria).err(),
            Some(IcpError::EmptyTarget)
        );
    }
}
