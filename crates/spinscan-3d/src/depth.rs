use serde::{Deserialize, Serialize};

use crate::pointcloud::{PointCloud, INVALID_POINT};

/// Error types for the depth module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DepthError {
    /// The depth buffer does not match the frame size.
    #[error("Depth buffer has {num_pixels} pixels, expected {width}x{height}")]
    InvalidFrameSize {
        /// Frame width.
        width: usize,
        /// Frame height.
        height: usize,
        /// Number of pixels in the buffer.
        num_pixels: usize,
    },

    /// The intrinsics or depth scale are not usable.
    #[error("Invalid camera parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Pinhole camera intrinsic parameters, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length along x.
    pub fx: f64,
    /// Focal length along y.
    pub fy: f64,
    /// Principal point x.
    pub cx: f64,
    /// Principal point y.
    pub cy: f64,
}

/// Deproject a depth frame into an organized point cloud in the camera frame.
///
/// Pixel `(u, v)` with raw depth `d` maps to
/// `z = d * depth_scale`, `x = (u - cx) z / fx`, `y = (v - cy) z / fy`.
/// Zero depth marks a missing measurement and produces an invalid (NaN) point.
///
/// # Arguments
///
/// * `depth` - Raw depth values in row-major order.
/// * `width` - The frame width.
/// * `height` - The frame height.
/// * `intrinsics` - The pinhole intrinsics of the depth sensor.
/// * `depth_scale` - Meters per raw depth unit, e.g. `0.001` for millimeters.
pub fn depth_to_organized_cloud(
    depth: &[u16],
    width: usize,
    height: usize,
    intrinsics: &CameraIntrinsics,
    depth_scale: f64,
) -> Result<PointCloud, DepthError> {
    if depth.len() != width * height {
        return Err(DepthError::InvalidFrameSize {
            width,
            height,
            num_pixels: depth.len(),
        });
    }
    if !(intrinsics.fx.is_normal() && intrinsics.fy.is_normal()) {
        return Err(DepthError::InvalidParameter("focal length must be non-zero"));
    }
    if !(depth_scale.is_finite() && depth_scale > 0.0) {
        return Err(DepthError::InvalidParameter("depth scale must be positive"));
    }

    let inv_fx = 1.0 / intrinsics.fx;
    let inv_fy = 1.0 / intrinsics.fy;

    let points = depth
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if d == 0 {
                return INVALID_POINT;
            }
            let u = (i % width) as f64;
            let v = (i / width) as f64;
            let z = d as f64 * depth_scale;
            [(u - intrinsics.cx) * z * inv_fx, (v - intrinsics.cy) * z * inv_fy, z]
        })
        .collect();

    PointCloud::new_organized(points, width, height).map_err(|_| DepthError::InvalidFrameSize {
        width,
        height,
        num_pixels: depth.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_depth_to_organized_cloud() -> Result<(), DepthError> {
        let intrinsics = CameraIntrinsics {
            fx: 2.0,
            fy: 4.0,
            cx: 1.0,
            cy: 0.5,
        };
        #[rustfmt::skip]
        let depth = [
            1000, 0, 2000,
            500, 1000, 0,
        ];
        let cloud = depth_to_organized_cloud(&depth, 3, 2, &intrinsics, 0.001)?;

        assert!(cloud.is_organized());
        assert_eq!(cloud.width(), 3);
        assert_eq!(cloud.height(), 2);
        assert_eq!(cloud.num_valid(), 4);
        assert!(cloud.points()[1][2].is_nan());

        let p = cloud.points()[2];
        assert_relative_eq!(p[0], 1.0);
        assert_relative_eq!(p[1], -0.25);
        assert_relative_eq!(p[2], 2.0);

        let p = cloud.points()[3];
        assert_relative_eq!(p[0], -0.25);
        assert_relative_eq!(p[1], 0.0625);
        assert_relative_eq!(p[2], 0.5);
        Ok(())
    }

    #[test]
    fn test_depth_invalid_inputs() {
        let intrinsics = CameraIntrinsics {
            fx: 1.0,
            fy: 1.0,
            cx: 0.0,
            cy: 0.0,
        };
        assert_eq!(
            depth_to_organized_cloud(&[1, 2, 3], 2, 2, &intrinsics, 0.001),
            Err(DepthError::InvalidFrameSize {
                width: 2,
                height: 2,
                num_pixels: 3
            })
        );
        assert!(depth_to_organized_cloud(&[1; 4], 2, 2, &intrinsics, 0.0).is_err());
        let bad = CameraIntrinsics {
            fx: 0.0,
            ..intrinsics
        };
        assert!(depth_to_organized_cloud(&[1; 4], 2, 2, &bad, 0.001).is_err());
    }
}
