#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Turntable axis and center-of-rotation calibration.
pub mod calibration;

/// Depth frame deprojection into organized point clouds.
pub mod depth;

/// Crop-box and voxel-grid filters.
pub mod filter;

/// I/O utilities for reading and writing 3D data.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Surface normal estimation from local neighborhoods.
pub mod normals;

/// Plane model and plane-related geometry.
pub mod plane;

/// Point cloud container.
pub mod pointcloud;

/// RANSAC plane segmentation.
pub mod segmentation;

/// 3D transforms algorithms.
pub mod transforms;
