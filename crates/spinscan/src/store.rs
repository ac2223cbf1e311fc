use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use spinscan_3d::{
    calibration::CalibrationResult,
    io::pcd::{read_pcd_binary, write_pcd_binary},
    pointcloud::PointCloud,
};

use crate::{ScanParams, SpinscanError};

/// File name of the persisted calibration.
pub const CALIBRATION_FILE: &str = "calibration.json";

/// File name of the persisted scan metadata.
pub const INFO_FILE: &str = "info.json";

/// The processing stage a stored cloud belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CloudType {
    /// A capture as delivered by the camera.
    Raw,
    /// A cropped and downsampled capture.
    Filtered,
    /// A filtered capture without the scanning bed.
    Segmented,
    /// A merged model.
    Registered,
}

impl CloudType {
    /// Name of the directory holding clouds of this type.
    pub fn dir_name(&self) -> &'static str {
        match self {
            CloudType::Raw => "raw",
            CloudType::Filtered => "filtered",
            CloudType::Segmented => "segmented",
            CloudType::Registered => "registered",
        }
    }
}

impl std::fmt::Display for CloudType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Metadata of a captured revolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    /// Table rotation between two captures, in degrees.
    pub degrees_per_step: f64,
    /// Number of steps per full revolution.
    pub num_steps: usize,
    /// Number of captures taken.
    pub num_captures: usize,
}

impl ScanInfo {
    /// Build the metadata of a capture run.
    pub fn from_params(params: &ScanParams) -> Result<Self, SpinscanError> {
        params.validate()?;
        Ok(Self {
            degrees_per_step: params.degrees_per_step(),
            num_steps: params.num_steps,
            num_captures: params.num_captures(),
        })
    }

    /// Name of the cloud captured at step `index`, its nominal angle in degrees.
    pub fn cloud_name(&self, index: usize) -> String {
        format!("{}", index as f64 * self.degrees_per_step)
    }
}

/// Storage of the clouds and metadata of one scan or calibration run.
pub trait CloudStore {
    /// Load a cloud by name and type.
    fn load(&self, name: &str, cloud_type: CloudType) -> Result<PointCloud, SpinscanError>;

    /// Save a cloud under a name and type, replacing any previous one.
    fn save(
        &mut self,
        cloud: &PointCloud,
        name: &str,
        cloud_type: CloudType,
    ) -> Result<(), SpinscanError>;

    /// Load the turntable calibration.
    fn load_calibration(&self) -> Result<CalibrationResult, SpinscanError>;

    /// Save the turntable calibration.
    fn save_calibration(&mut self, calibration: &CalibrationResult) -> Result<(), SpinscanError>;

    /// Load the scan metadata.
    fn load_info(&self) -> Result<ScanInfo, SpinscanError>;

    /// Save the scan metadata.
    fn save_info(&mut self, info: &ScanInfo) -> Result<(), SpinscanError>;
}

/// A store keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCloudStore {
    clouds: HashMap<(CloudType, String), PointCloud>,
    calibration: Option<CalibrationResult>,
    info: Option<ScanInfo>,
}

impl MemoryCloudStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored clouds of all types.
    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    /// Whether no cloud is stored.
    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }

    /// Sorted names of the stored clouds of a type.
    pub fn names(&self, cloud_type: CloudType) -> Vec<&str> {
        let mut names = self
            .clouds
            .keys()
            .filter(|(t, _)| *t == cloud_type)
            .map(|(_, name)| name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl CloudStore for MemoryCloudStore {
    fn load(&self, name: &str, cloud_type: CloudType) -> Result<PointCloud, SpinscanError> {
        self.clouds
            .get(&(cloud_type, name.to_string()))
            .cloned()
            .ok_or_else(|| SpinscanError::CloudNotFound {
                name: name.to_string(),
                cloud_type,
            })
    }

    fn save(
        &mut self,
        cloud: &PointCloud,
        name: &str,
        cloud_type: CloudType,
    ) -> Result<(), SpinscanError> {
        self.clouds
            .insert((cloud_type, name.to_string()), cloud.clone());
        Ok(())
    }

    fn load_calibration(&self) -> Result<CalibrationResult, SpinscanError> {
        self.calibration
            .clone()
            .ok_or_else(|| SpinscanError::MissingMetadata("calibration".into()))
    }

    fn save_calibration(&mut self, calibration: &CalibrationResult) -> Result<(), SpinscanError> {
        self.calibration = Some(calibration.clone());
        Ok(())
    }

    fn load_info(&self) -> Result<ScanInfo, SpinscanError> {
        self.info
            .clone()
            .ok_or_else(|| SpinscanError::MissingMetadata("scan info".into()))
    }

    fn save_info(&mut self, info: &ScanInfo) -> Result<(), SpinscanError> {
        self.info = Some(info.clone());
        Ok(())
    }
}

/// A store backed by a directory.
///
/// Clouds are binary PCD files at `<root>/<type>/<name>.pcd`, the calibration
/// and the scan metadata are JSON files at the root.
#[derive(Debug, Clone)]
pub struct FileCloudStore {
    root: PathBuf,
}

impl FileCloudStore {
    /// Create a store rooted at `root`. Directories are created on save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a cloud.
    pub fn cloud_path(&self, name: &str, cloud_type: CloudType) -> PathBuf {
        self.root
            .join(cloud_type.dir_name())
            .join(format!("{name}.pcd"))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, file_name: &str) -> Result<T, SpinscanError> {
        let path = self.root.join(file_name);
        if !path.exists() {
            return Err(SpinscanError::MissingMetadata(path.display().to_string()));
        }
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<(), SpinscanError> {
        std::fs::create_dir_all(&self.root)?;
        let file = File::create(self.root.join(file_name))?;
        serde_json::to_writer_pretty(BufWriter::new(file), value)?;
        Ok(())
    }
}

impl CloudStore for FileCloudStore {
    fn load(&self, name: &str, cloud_type: CloudType) -> Result<PointCloud, SpinscanError> {
        let path = self.cloud_path(name, cloud_type);
        if !path.exists() {
            return Err(SpinscanError::CloudNotFound {
                name: name.to_string(),
                cloud_type,
            });
        }
        Ok(read_pcd_binary(path)?)
    }

    fn save(
        &mut self,
        cloud: &PointCloud,
        name: &str,
        cloud_type: CloudType,
    ) -> Result<(), SpinscanError> {
        let path = self.cloud_path(name, cloud_type);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        write_pcd_binary(&path, cloud)?;
        log::debug!("Saved {} points to {}", cloud.len(), path.display());
        Ok(())
    }

    fn load_calibration(&self) -> Result<CalibrationResult, SpinscanError> {
        self.read_json(CALIBRATION_FILE)
    }

    fn save_calibration(&mut self, calibration: &CalibrationResult) -> Result<(), SpinscanError> {
        self.write_json(CALIBRATION_FILE, calibration)
    }

    fn load_info(&self) -> Result<ScanInfo, SpinscanError> {
        self.read_json(INFO_FILE)
    }

    fn save_info(&mut self, info: &ScanInfo) -> Result<(), SpinscanError> {
        self.write_json(INFO_FILE, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spinscan_3d::{
        calibration::RotationAxis, plane::UnitVector, pointcloud::INVALID_POINT,
    };

    fn sample_cloud() -> Result<PointCloud, Box<dyn std::error::Error>> {
        Ok(PointCloud::new_organized(
            vec![[0.5, -0.25, 1.0], INVALID_POINT, [0.125, 0.75, 2.0], [1.0; 3]],
            2,
            2,
        )?)
    }

    #[test]
    fn test_cloud_names() {
        let info = ScanInfo {
            degrees_per_step: 22.5,
            num_steps: 16,
            num_captures: 16,
        };
        assert_eq!(info.cloud_name(0), "0");
        assert_eq!(info.cloud_name(1), "22.5");
        assert_eq!(info.cloud_name(4), "90");
    }

    #[test]
    fn test_memory_store() -> Result<(), Box<dyn std::error::Error>> {
        let mut store = MemoryCloudStore::new();
        let cloud = sample_cloud()?;
        store.save(&cloud, "45", CloudType::Raw)?;
        store.save(&cloud, "0", CloudType::Raw)?;
        store.save(&cloud, "0", CloudType::Filtered)?;

        assert_eq!(store.len(), 3);
        assert_eq!(store.names(CloudType::Raw), vec!["0", "45"]);
        assert_eq!(store.load("45", CloudType::Raw)?.len(), 4);
        assert!(matches!(
            store.load("45", CloudType::Segmented),
            Err(SpinscanError::CloudNotFound {
                cloud_type: CloudType::Segmented,
                ..
            })
        ));
        assert!(matches!(
            store.load_calibration(),
            Err(SpinscanError::MissingMetadata(_))
        ));
        Ok(())
    }

    #[test]
    fn test_file_store() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let mut store = FileCloudStore::new(tmp_dir.path());

        let cloud = sample_cloud()?;
        store.save(&cloud, "90", CloudType::Filtered)?;
        assert!(tmp_dir.path().join("filtered").join("90.pcd").exists());

        let loaded = store.load("90", CloudType::Filtered)?;
        assert_eq!(loaded.width(), 2);
        assert_eq!(loaded.height(), 2);
        assert!(loaded.points()[1][0].is_nan());
        assert_relative_eq!(loaded.points()[2][1], 0.75);

        assert!(matches!(
            store.load("90", CloudType::Raw),
            Err(SpinscanError::CloudNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_file_store_metadata() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let mut store = FileCloudStore::new(tmp_dir.path().join("scan"));
        assert!(matches!(
            store.load_info(),
            Err(SpinscanError::MissingMetadata(_))
        ));

        let info = ScanInfo::from_params(&ScanParams::default())?;
        store.save_info(&info)?;
        assert_eq!(store.load_info()?, info);

        let calibration = CalibrationResult::new(
            RotationAxis {
                direction: UnitVector::new([0.0, -1.0, 0.0])?,
                center: [0.0, 0.05, 0.4],
            },
            7,
            1e-4,
        );
        store.save_calibration(&calibration)?;
        assert!(tmp_dir.path().join("scan").join(CALIBRATION_FILE).exists());

        let loaded = store.load_calibration()?;
        assert_eq!(loaded.num_equations, 7);
        for i in 0..3 {
            assert_relative_eq!(loaded.axis.center[i], calibration.axis.center[i]);
            assert_relative_eq!(
                loaded.transform.translation[i],
                calibration.transform.translation[i]
            );
        }
        Ok(())
    }
}
