mod parser;
pub use parser::read_pcd_binary;

mod writer;
pub use writer::write_pcd_binary;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read or write the PCD file.
    #[error("Failed to access PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header.
    #[error("Unsupported PCD header")]
    UnsupportedProperty,

    /// Malformed PCD header.
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Invalid PCD file extension.
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),
}

/// Check that a path carries the `.pcd` extension.
fn check_extension(path: &std::path::Path) -> Result<(), PcdError> {
    let Some(file_ext) = path.extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}
