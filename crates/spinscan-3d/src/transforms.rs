use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::linalg::{self, array33_to_dmat3, dmat3_to_array33};
use crate::plane::UnitVector;
use crate::pointcloud::PointCloud;

/// Error types for the transforms module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransformError {
    /// The rotation axis is the zero vector.
    #[error("Cannot compute a rotation matrix from a zero axis")]
    ZeroAxis,

    /// The input cloud has no valid point.
    #[error("Cannot transform a point cloud without valid points")]
    EmptyCloud,

    /// The point buffer could not be transformed.
    #[error(transparent)]
    Linalg(#[from] linalg::LinalgError),
}

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The row-major rotation matrix.
///
/// Example:
///
/// ```
/// use spinscan_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], TransformError> {
    // normalize the vector
    let axis_norm = {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        match magnitude < 1e-10 {
            true => return Err(TransformError::ZeroAxis),
            false => [
                axis[0] / magnitude,
                axis[1] / magnitude,
                axis[2] / magnitude,
            ],
        }
    };

    let x = axis_norm[0];
    let y = axis_norm[1];
    let z = axis_norm[2];

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let m00 = c + x * x * t;
    let m11 = c + y * y * t;
    let m22 = c + z * z * t;

    let tmp1 = x * y * t;
    let tmp2 = z * s;

    let m10 = tmp1 + tmp2;
    let m01 = tmp1 - tmp2;

    let tmp3 = x * z * t;
    let tmp4 = y * s;

    let m20 = tmp3 - tmp4;
    let m02 = tmp3 + tmp4;

    let tmp5 = y * z * t;
    let tmp6 = x * s;

    let m12 = tmp5 - tmp6;
    let m21 = tmp5 + tmp6;

    Ok([[m00, m01, m02], [m10, m11, m12], [m20, m21, m22]])
}

/// Rotation about the +Z axis by `angle` radians.
pub fn rotation_about_z(angle: f64) -> [[f64; 3]; 3] {
    let (s, c) = angle.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

/// Rotation angle about +Z in radians, in `(-pi, pi]`, of a rotation matrix.
///
/// Meaningful for rotations whose axis is (close to) +Z.
pub fn yaw_of(rotation: &[[f64; 3]; 3]) -> f64 {
    rotation[1][0].atan2(rotation[0][0])
}

/// The minimal-angle proper rotation mapping direction `from` onto `to`.
///
/// When the directions are opposite the rotation is a half turn about an
/// axis perpendicular to `from`.
pub fn rotation_between(from: &UnitVector, to: &UnitVector) -> [[f64; 3]; 3] {
    let f = from.as_dvec3();
    let t = to.as_dvec3();
    let cos = f.dot(t).clamp(-1.0, 1.0);
    let axis = f.cross(t);
    let sin = axis.length();

    if sin < 1e-12 {
        if cos > 0.0 {
            return dmat3_to_array33(&DMat3::IDENTITY);
        }
        // half turn about any axis perpendicular to `from`
        let perp = f.any_orthonormal_vector();
        let r = DMat3::from_axis_angle(perp, std::f64::consts::PI);
        return dmat3_to_array33(&r);
    }

    let r = DMat3::from_axis_angle(axis / sin, sin.atan2(cos));
    dmat3_to_array33(&r)
}

/// A rigid transform `p' = R p + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    /// Row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Create a transform from a rotation and a translation.
    pub fn new(rotation: [[f64; 3]; 3], translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            translation: [0.0; 3],
        }
    }

    /// A pure rotation about +Z through the origin.
    pub fn from_yaw(angle: f64) -> Self {
        Self::new(rotation_about_z(angle), [0.0; 3])
    }

    /// The inverse transform, `p = R^T p' - R^T t`.
    pub fn inverse(&self) -> Self {
        let rotation = linalg::transpose33(&self.rotation);
        let t = linalg::matvec33(&rotation, &self.translation);
        Self {
            rotation,
            translation: [-t[0], -t[1], -t[2]],
        }
    }

    /// Compose transforms, the result applies `other` first and then `self`.
    pub fn compose(&self, other: &RigidTransform) -> Self {
        let r = array33_to_dmat3(&self.rotation);
        let t = r * DVec3::from_array(other.translation) + DVec3::from_array(self.translation);
        Self {
            rotation: dmat3_to_array33(&(r * array33_to_dmat3(&other.rotation))),
            translation: t.to_array(),
        }
    }

    /// Transform a single point.
    pub fn apply_point(&self, p: &[f64; 3]) -> [f64; 3] {
        let r = linalg::matvec33(&self.rotation, p);
        [
            r[0] + self.translation[0],
            r[1] + self.translation[1],
            r[2] + self.translation[2],
        ]
    }

    /// Determinant of the rotation part, `+1` for a proper rotation.
    pub fn determinant(&self) -> f64 {
        array33_to_dmat3(&self.rotation).determinant()
    }

    /// Yaw of the rotation part about +Z in radians.
    pub fn yaw(&self) -> f64 {
        yaw_of(&self.rotation)
    }

    /// Transform a point cloud, returning a new cloud with the same layout.
    ///
    /// Invalid points of organized clouds are passed through unchanged.
    ///
    /// # Errors
    ///
    /// [`TransformError::EmptyCloud`] if the cloud has no valid point.
    pub fn apply(&self, cloud: &PointCloud) -> Result<PointCloud, TransformError> {
        if cloud.num_valid() == 0 {
            return Err(TransformError::EmptyCloud);
        }
        let mut points = vec![[0.0; 3]; cloud.len()];
        linalg::transform_points(
            cloud.points(),
            &self.rotation,
            &self.translation,
            &mut points,
        )?;
        Ok(with_layout_of(cloud, points))
    }
}

/// Rebuild a cloud with the layout of `like` and new points of the same length.
pub(crate) fn with_layout_of(like: &PointCloud, points: Vec<[f64; 3]>) -> PointCloud {
    if like.is_organized() {
        PointCloud::new_organized(points, like.width(), like.height())
            .unwrap_or_else(|e| unreachable!("layout preserved by construction: {e}"))
    } else {
        PointCloud::new(points)
    }
}

/// Rotate a cloud by `theta` radians about the line through `line_point` along `line_direction`.
///
/// # Arguments
///
/// * `cloud` - The cloud to rotate.
/// * `line_point` - A point on the rotation line.
/// * `line_direction` - Direction of the rotation line, normalized internally.
/// * `theta` - The rotation angle in radians, counter-clockwise about the direction.
pub fn rotate_about_line(
    cloud: &PointCloud,
    line_point: &[f64; 3],
    line_direction: &[f64; 3],
    theta: f64,
) -> Result<PointCloud, TransformError> {
    let rotation = axis_angle_to_rotation_matrix(line_direction, theta)?;
    // p' = R (p - c) + c
    let rc = linalg::matvec33(&rotation, line_point);
    let translation = [
        line_point[0] - rc[0],
        line_point[1] - rc[1],
        line_point[2] - rc[2],
    ];
    RigidTransform::new(rotation, translation).apply(cloud)
}
