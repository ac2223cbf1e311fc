use std::io::Write;
use std::path::Path;

use super::{check_extension, PcdError};
use crate::pointcloud::PointCloud;

/// Write a point cloud as a binary PCD file with `x y z` float fields.
///
/// The `WIDTH` and `HEIGHT` header entries carry the cloud layout so that
/// organized clouds are restored as organized by [`super::read_pcd_binary`].
/// Coordinates are stored as `f32`.
///
/// # Arguments
/// * `path` - Path to the `.pcd` file to create or overwrite.
/// * `cloud` - The cloud to write.
pub fn write_pcd_binary(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), PcdError> {
    check_extension(path.as_ref())?;

    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS x y z")?;
    writeln!(writer, "SIZE 4 4 4")?;
    writeln!(writer, "TYPE F F F")?;
    writeln!(writer, "COUNT 1 1 1")?;
    writeln!(writer, "WIDTH {}", cloud.width())?;
    writeln!(writer, "HEIGHT {}", cloud.height())?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", cloud.len())?;
    writeln!(writer, "DATA binary")?;

    for p in cloud.points() {
        for v in p {
            writer.write_all(&(*v as f32).to_le_bytes())?;
        }
    }

    writer.flush()?;

    Ok(())
}
