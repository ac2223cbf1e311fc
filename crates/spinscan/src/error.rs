use spinscan_3d::{
    calibration::CalibrationError, depth::DepthError, filter::FilterError, io::pcd::PcdError,
    segmentation::SegmentationError, transforms::TransformError,
};
use spinscan_icp::{IcpError, RegistrationError};

use crate::store::CloudType;

/// An error type for the scanner pipelines.
#[derive(Debug, thiserror::Error)]
pub enum SpinscanError {
    /// Cloud conditioning failed.
    #[error("Filtering failed. {0}")]
    Filter(#[from] FilterError),

    /// Plane segmentation failed.
    #[error("Plane segmentation failed. {0}")]
    Segmentation(#[from] SegmentationError),

    /// Turntable calibration failed.
    #[error("Calibration failed. {0}")]
    Calibration(#[from] CalibrationError),

    /// A cloud could not be transformed.
    #[error("Transform failed. {0}")]
    Transform(#[from] TransformError),

    /// Depth deprojection failed.
    #[error("Depth deprojection failed. {0}")]
    Depth(#[from] DepthError),

    /// ICP failed.
    #[error("ICP failed. {0}")]
    Icp(#[from] IcpError),

    /// Multi-view registration failed.
    #[error("Registration failed. {0}")]
    Registration(#[from] RegistrationError),

    /// A PCD file could not be read or written.
    #[error("PCD error. {0}")]
    Pcd(#[from] PcdError),

    /// Failed to access a file.
    #[error("Failed to manipulate the file. {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error. {0}")]
    Json(#[from] serde_json::Error),

    /// The requested cloud is not in the store.
    #[error("Cloud {name} of type {cloud_type} not found")]
    CloudNotFound {
        /// Name of the cloud.
        name: String,
        /// Type of the cloud.
        cloud_type: CloudType,
    },

    /// The requested metadata is not in the store.
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// The configuration is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The capture collaborator failed.
    #[error("Capture failed. {0}")]
    Capture(#[from] crate::session::CaptureError),
}
