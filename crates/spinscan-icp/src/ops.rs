use glam::{DMat3, DVec3};
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use spinscan_3d::transforms::RigidTransform;

use crate::IcpError;

/// Compute the rigid transformation that best maps `points_in_src` onto `points_in_dst`.
///
/// Least-squares fit of paired points (Kabsch / Arun et al.):
/// 1. Center both sets on their centroids.
/// 2. Build the cross-covariance `H = Σ (src - src_mean)(dst - dst_mean)ᵀ`.
/// 3. With `H = U S Vᵀ`, the rotation is `R = V Uᵀ`, with the last column of
///    `V` negated when needed to avoid a reflection.
/// 4. The translation is `t = dst_mean - R src_mean`.
///
/// # Errors
///
/// [`IcpError::NotEnoughCorrespondences`] if the sets differ in length or hold fewer than 3 points.
pub fn fit_transformation(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
) -> Result<RigidTransform, IcpError> {
    if points_in_src.len() != points_in_dst.len() || points_in_src.len() < 3 {
        return Err(IcpError::NotEnoughCorrespondences(
            points_in_src.len().min(points_in_dst.len()),
        ));
    }

    // Identity transformation is a special case
    if points_in_src == points_in_dst {
        return Ok(RigidTransform::identity());
    }

    // compute centroids
    let (src_centroid, dst_centroid) = compute_centroids(points_in_src, points_in_dst);

    // compute covariance matrix H = Σ[(src - src_mean) * (dst - dst_mean)^T]
    let mut h = DMat3::ZERO;
    for (p_in_src, p_in_dst) in points_in_src.iter().zip(points_in_dst.iter()) {
        let src_centered = DVec3::from_array(*p_in_src) - src_centroid;
        let dst_centered = DVec3::from_array(*p_in_dst) - dst_centroid;
        h += DMat3::from_cols(
            src_centered * dst_centered.x,
            src_centered * dst_centered.y,
            src_centered * dst_centered.z,
        );
    }

    let svd = faer::Mat::<f64>::from_fn(3, 3, |i, j| h.col(j)[i]).svd();
    let to_dmat3 = |m: faer::MatRef<'_, f64>| {
        DMat3::from_cols(
            DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
            DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
            DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
        )
    };
    let u = to_dmat3(svd.u());
    let v = to_dmat3(svd.v());

    // Compute rotation matrix R = V * U^T
    let mut r = v * u.transpose();

    // Handle reflection case to ensure proper rotation matrix
    if r.determinant() < 0.0 {
        let v_corrected = DMat3::from_cols(v.x_axis, v.y_axis, -v.z_axis);
        r = v_corrected * u.transpose();
    }

    // Compute translation vector
    let t = dst_centroid - r * src_centroid;

    Ok(RigidTransform::new(
        spinscan_3d::linalg::dmat3_to_array33(&r),
        t.to_array(),
    ))
}

/// Compute the centroids of two sets of points.
pub(crate) fn compute_centroids(points1: &[[f64; 3]], points2: &[[f64; 3]]) -> (DVec3, DVec3) {
    let centroid1 = points1
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p))
        / points1.len() as f64;
    let centroid2 = points2
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p))
        / points2.len() as f64;
    (centroid1, centroid2)
}

/// Paired points and their squared distances.
pub(crate) struct Correspondences {
    pub points_in_src: Vec<[f64; 3]>,
    pub points_in_dst: Vec<[f64; 3]>,
    pub sq_distances: Vec<f64>,
}

/// Pair every source point with its nearest target point.
///
/// Pairs farther than `median + 3 sigma` are dropped, with sigma estimated
/// from the median absolute deviation of the squared distances.
/// An empty source yields no correspondence.
pub(crate) fn find_correspondences(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    kdtree: &ImmutableKdTree<f64, u32, 3, 32>,
) -> Correspondences {
    // find nearest neighbors for each point in source
    let nn_results = source
        .iter()
        .map(|p| kdtree.nearest_one::<kiddo::SquaredEuclidean>(p))
        .collect::<Vec<_>>();

    if nn_results.is_empty() {
        return Correspondences {
            points_in_src: Vec::new(),
            points_in_dst: Vec::new(),
            sq_distances: Vec::new(),
        };
    }

    // compute median distance
    let mut distances = nn_results.iter().map(|nn| nn.distance).collect::<Vec<_>>();
    distances.sort_by(f64::total_cmp);
    let median_dist = distances[distances.len() / 2];

    // compute median absolute deviation
    let mut dmed = distances
        .iter()
        .map(|d| (d - median_dist).abs())
        .collect::<Vec<_>>();
    dmed.sort_by(f64::total_cmp);
    let mad = dmed[dmed.len() / 2];
    let sigma_d = 1.4826 * mad;

    // exact matches are always kept, even when most distances are zero
    let max_dist = (median_dist + 3.0 * sigma_d).max(f64::EPSILON);

    let mut correspondences = Correspondences {
        points_in_src: Vec::with_capacity(source.len()),
        points_in_dst: Vec::with_capacity(source.len()),
        sq_distances: Vec::with_capacity(source.len()),
    };
    for (p, nn) in source.iter().zip(nn_results.iter()) {
        if nn.distance <= max_dist {
            correspondences.points_in_src.push(*p);
            correspondences.points_in_dst.push(target[nn.item as usize]);
            correspondences.sq_distances.push(nn.distance);
        }
    }

    correspondences
}

/// Accumulate an incremental transform, `new = delta ∘ current`.
pub(crate) fn update_transformation(current: &mut RigidTransform, delta: &RigidTransform) {
    *current = delta.compose(current);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use spinscan_3d::transforms::axis_angle_to_rotation_matrix;

    fn create_random_points(num_points: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| [rng.random(), rng.random(), rng.random()])
            .collect()
    }

    fn create_random_transform(
        factor: f64,
        rng: &mut StdRng,
    ) -> Result<RigidTransform, Box<dyn std::error::Error>> {
        let axis = [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()];
        let angle = rng.random::<f64>() * factor;
        let translation = [
            rng.random::<f64>() * factor,
            rng.random::<f64>() * factor,
            rng.random::<f64>() * factor,
        ];
        Ok(RigidTransform::new(
            axis_angle_to_rotation_matrix(&axis, angle)?,
            translation,
        ))
    }

    #[test]
    fn test_compute_centroids() {
        let points1 = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let points2 = vec![[7.0, 8.0, 9.0], [10.0, 11.0, 12.0]];
        let (centroid1, centroid2) = compute_centroids(&points1, &points2);
        assert_relative_eq!(centroid1.x, 2.5, epsilon = 1e-12);
        assert_relative_eq!(centroid1.y, 3.5, epsilon = 1e-12);
        assert_relative_eq!(centroid1.z, 4.5, epsilon = 1e-12);
        assert_relative_eq!(centroid2.x, 8.5, epsilon = 1e-12);
        assert_relative_eq!(centroid2.y, 9.5, epsilon = 1e-12);
        assert_relative_eq!(centroid2.z, 10.5, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_transformation_identity() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(0);
        let points_src = create_random_points(30, &mut rng);
        let fitted = fit_transformation(&points_src, &points_src)?;
        assert_eq!(fitted, RigidTransform::identity());
        Ok(())
    }

    #[test]
    fn test_fit_transformation_rotation() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(1);
        let points_src = create_random_points(30, &mut rng);

        let expected = RigidTransform::new(
            axis_angle_to_rotation_matrix(&[1.0, 0.0, 0.0], std::f64::consts::PI / 2.0)?,
            [0.0; 3],
        );
        let points_dst = points_src
            .iter()
            .map(|p| expected.apply_point(p))
            .collect::<Vec<_>>();

        let fitted = fit_transformation(&points_src, &points_dst)?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(fitted.rotation[i][j], expected.rotation[i][j], epsilon = 1e-9);
            }
            assert_relative_eq!(fitted.translation[i], 0.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_random() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(2);
        let points_src = create_random_points(30, &mut rng);

        for _ in 0..10 {
            let expected = create_random_transform(0.5, &mut rng)?;
            let points_dst = points_src
                .iter()
                .map(|p| expected.apply_point(p))
                .collect::<Vec<_>>();

            let fitted = fit_transformation(&points_src, &points_dst)?;
            assert_relative_eq!(fitted.determinant(), 1.0, epsilon = 1e-9);
            for (p, q) in points_src.iter().zip(points_dst.iter()) {
                let r = fitted.apply_point(p);
                for i in 0..3 {
                    assert_relative_eq!(r[i], q[i], epsilon = 1e-9);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_not_enough_points() {
        let points = [[0.0; 3], [1.0, 0.0, 0.0]];
        assert!(matches!(
            fit_transformation(&points, &points),
            Err(IcpError::NotEnoughCorrespondences(2))
        ));
    }

    #[test]
    fn test_find_correspondences() {
        let points_src = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let points_dst = vec![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0]];

        let kdtree = ImmutableKdTree::new_from_slice(&points_dst);
        let corr = find_correspondences(&points_src, &points_dst, &kdtree);

        assert_eq!(corr.points_in_src.len(), corr.points_in_dst.len());
        assert_eq!(corr.points_in_src.len(), 4);
        assert_eq!(corr.sq_distances, vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(corr.points_in_dst[3], [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_find_correspondences_rejects_far_pairs() {
        let mut points_src = (0..10).map(|i| [i as f64, 0.0, 0.0]).collect::<Vec<_>>();
        let points_dst = points_src.iter().map(|p| [p[0], 0.01, 0.0]).collect::<Vec<_>>();
        points_src.push([4.0, 5.0, 0.0]);

        let kdtree = ImmutableKdTree::new_from_slice(&points_dst);
        let corr = find_correspondences(&points_src, &points_dst, &kdtree);
        assert_eq!(corr.points_in_src.len(), 10);
    }

    #[test]
    fn test_update_transformation() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(3);
        let first = create_random_transform(1.0, &mut rng)?;
        let delta = create_random_transform(1.0, &mut rng)?;

        let mut accumulated = first;
        update_transformation(&mut accumulated, &delta);

        let p = [0.3, -0.2, 0.7];
        let expected = delta.apply_point(&first.apply_point(&p));
        let actual = accumulated.apply_point(&p);
        for i in 0..3 {
            assert_relative_eq!(actual[i], expected[i], epsilon = 1e-12);
        }
        Ok(())
    }
}
