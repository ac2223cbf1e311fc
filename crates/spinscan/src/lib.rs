#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use spinscan_3d as s3d;

#[doc(inline)]
pub use spinscan_icp as icp;

/// Pipeline configuration.
pub mod config;

/// Top-level error type.
pub mod error;

/// Calibration and scan processing pipelines.
pub mod pipeline;

/// Capture sessions driving a turntable and a depth camera.
pub mod session;

/// Persistence of clouds and scan metadata.
pub mod store;

/// A simulated turntable for tests and demos.
pub mod synthetic;

pub use config::{PipelineConfig, ScanParams};
pub use error::SpinscanError;
pub use pipeline::{calibrate_from_clouds, process_scan};
pub use session::{CalibrationSession, CaptureError, ScanSession, TurntableCapture};
pub use store::{CloudStore, CloudType, FileCloudStore, MemoryCloudStore, ScanInfo};
