use glam::{DMat3, DVec3};

/// Error types for the linear algebra module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LinalgError {
    /// The source and destination buffers differ in length.
    #[error("Source and destination lengths differ: {0} != {1}")]
    LengthMismatch(usize, usize),
}

/// Convert a row-major 3x3 array into a glam matrix.
#[inline]
pub fn array33_to_dmat3(m: &[[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(m[0][0], m[1][0], m[2][0]),
        DVec3::new(m[0][1], m[1][1], m[2][1]),
        DVec3::new(m[0][2], m[1][2], m[2][2]),
    )
}

/// Convert a glam matrix into a row-major 3x3 array.
#[inline]
pub fn dmat3_to_array33(m: &DMat3) -> [[f64; 3]; 3] {
    [
        [m.x_axis.x, m.y_axis.x, m.z_axis.x],
        [m.x_axis.y, m.y_axis.y, m.z_axis.y],
        [m.x_axis.z, m.y_axis.z, m.z_axis.z],
    ]
}

/// Transform a set of points using a rotation and translation.
///
/// Computes `dst = dst_r_src * src + dst_t_src` for every point. Non-finite
/// points are copied through unchanged so that organized clouds keep their
/// invalid markers.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A row-major rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated buffer to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use spinscan_3d::linalg::transform_points;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [0.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points(&src_points, &rotation, &translation, &mut dst_points).unwrap();
/// assert_eq!(dst_points, src_points);
/// ```
pub fn transform_points(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) -> Result<(), LinalgError> {
    if src_points.len() != dst_points.len() {
        return Err(LinalgError::LengthMismatch(
            src_points.len(),
            dst_points.len(),
        ));
    }

    let r = array33_to_dmat3(dst_r_src);
    let t = DVec3::from_array(*dst_t_src);

    for (src, dst) in src_points.iter().zip(dst_points.iter_mut()) {
        if !crate::pointcloud::is_valid_point(src) {
            *dst = *src;
            continue;
        }
        *dst = (r * DVec3::from_array(*src) + t).to_array();
    }

    Ok(())
}

/// Centroid and direction of least variance of a set of points.
///
/// The direction is the singular vector of the centered covariance with the
/// smallest singular value, the normal of the best fitting plane. Returns
/// `None` for fewer than three points.
pub fn least_variance_direction<'a>(
    points: impl Iterator<Item = &'a [f64; 3]> + Clone,
) -> Option<([f64; 3], [f64; 3])> {
    let (sum, n) = points.clone().fold(([0.0; 3], 0usize), |(acc, n), p| {
        ([acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]], n + 1)
    });
    if n < 3 {
        return None;
    }
    let centroid = [sum[0] / n as f64, sum[1] / n as f64, sum[2] / n as f64];

    let mut cov = [[0.0; 3]; 3];
    for p in points {
        let d = [p[0] - centroid[0], p[1] - centroid[1], p[2] - centroid[2]];
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] += d[i] * d[j];
            }
        }
    }

    // singular values are sorted in decreasing order
    let svd = faer::Mat::<f64>::from_fn(3, 3, |i, j| cov[i][j]).svd();
    let v = svd.v();
    Some((centroid, [v.read(0, 2), v.read(1, 2), v.read(2, 2)]))
}

/// Transpose a row-major 3x3 matrix.
pub fn transpose33(a: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut t = [[0.0; 3]; 3];
    for (i, row) in a.iter().enumerate() {
        for (j, val) in row.iter().enumerate() {
            t[j][i] = *val;
        }
    }
    t
}

/// Multiply a row-major 3x3 matrix by a vector.
#[inline]
pub fn matvec33(a: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        a[0][0] * v[0] + a[0][1] * v[1] + a[0][2] * v[2],
        a[1][0] * v[0] + a[1][1] * v[1] + a[1][2] * v[2],
        a[2][0] * v[0] + a[2][1] * v[1] + a[2][2] * v[2],
    ]
}
