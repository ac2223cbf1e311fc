use spinscan_3d::{calibration::CalibrationResult, pointcloud::PointCloud};
use spinscan_icp::ScanSet;

use crate::{
    pipeline::calibrate_from_clouds,
    store::{CloudStore, CloudType, ScanInfo},
    PipelineConfig, ScanParams, SpinscanError,
};

/// Error reported by a capture collaborator.
pub type CaptureError = Box<dyn std::error::Error + Send + Sync>;

/// A depth camera looking at a motorized turntable.
pub trait TurntableCapture {
    /// Capture a cloud of the current view in the camera frame.
    fn capture(&mut self) -> Result<PointCloud, CaptureError>;

    /// Turn the table by `degrees`, returning once the rotation completed.
    fn rotate_by(&mut self, degrees: f64) -> Result<(), CaptureError>;
}

/// Capture `info.num_captures` clouds one table step apart and save them as raw clouds.
fn capture_revolution(
    info: &ScanInfo,
    capture: &mut impl TurntableCapture,
    store: &mut impl CloudStore,
) -> Result<Vec<PointCloud>, SpinscanError> {
    let mut clouds = Vec::with_capacity(info.num_captures);
    for i in 0..info.num_captures {
        let cloud = capture.capture()?;
        let name = info.cloud_name(i);
        store.save(&cloud, &name, CloudType::Raw)?;
        log::info!(
            "Captured view {}/{} at {} deg: {} points",
            i + 1,
            info.num_captures,
            name,
            cloud.len()
        );
        clouds.push(cloud);
        capture.rotate_by(info.degrees_per_step)?;
    }
    Ok(clouds)
}

/// Captures one revolution of an object.
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    params: ScanParams,
}

impl ScanSession {
    /// Create a session with the given capture parameters.
    pub fn new(params: ScanParams) -> Self {
        Self { params }
    }

    /// The capture parameters.
    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    /// Capture every step, saving the scan metadata and the raw clouds.
    ///
    /// The clouds are stored under their nominal angle in degrees and returned
    /// as a scan set in the camera frame.
    pub fn run(
        &self,
        capture: &mut impl TurntableCapture,
        store: &mut impl CloudStore,
    ) -> Result<ScanSet, SpinscanError> {
        let info = ScanInfo::from_params(&self.params)?;
        store.save_info(&info)?;

        let clouds = capture_revolution(&info, capture, store)?;

        let mut scans = ScanSet::new(info.num_steps);
        for (i, cloud) in clouds.into_iter().enumerate() {
            scans.push(i, cloud);
        }
        Ok(scans)
    }
}

/// Captures a calibration target and calibrates the turntable.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSession {
    params: ScanParams,
}

impl CalibrationSession {
    /// Create a session with the given capture parameters.
    pub fn new(params: ScanParams) -> Self {
        Self { params }
    }

    /// Capture the calibration target at every step, calibrate and save the result.
    pub fn run(
        &self,
        capture: &mut impl TurntableCapture,
        store: &mut impl CloudStore,
        config: &PipelineConfig,
    ) -> Result<CalibrationResult, SpinscanError> {
        let info = ScanInfo::from_params(&self.params)?;
        store.save_info(&info)?;

        let clouds = capture_revolution(&info, capture, store)?;
        let calibration = calibrate_from_clouds(&clouds, &config.filter, &config.calibration)?;
        store.save_calibration(&calibration)?;
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCloudStore;

    /// Returns a single point at the current table angle.
    struct Counter {
        angle: f64,
        rotations: usize,
    }

    impl TurntableCapture for Counter {
        fn capture(&mut self) -> Result<PointCloud, CaptureError> {
            Ok(PointCloud::new(vec![[self.angle, 0.0, 0.0]]))
        }

        fn rotate_by(&mut self, degrees: f64) -> Result<(), CaptureError> {
            self.angle += degrees;
            self.rotations += 1;
            Ok(())
        }
    }

    struct Broken;

    impl TurntableCapture for Broken {
        fn capture(&mut self) -> Result<PointCloud, CaptureError> {
            Err("camera disconnected".into())
        }

        fn rotate_by(&mut self, _degrees: f64) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    #[test]
    fn test_scan_session() -> Result<(), SpinscanError> {
        let mut capture = Counter {
            angle: 0.0,
            rotations: 0,
        };
        let mut store = MemoryCloudStore::new();
        let session = ScanSession::new(ScanParams {
            num_steps: 4,
            num_captures: Some(3),
        });

        let scans = session.run(&mut capture, &mut store)?;
        assert_eq!(scans.num_steps(), 4);
        assert_eq!(scans.len(), 3);
        assert_eq!(capture.rotations, 3);
        assert_eq!(store.names(CloudType::Raw), vec!["0", "180", "90"]);
        assert_eq!(store.load("180", CloudType::Raw)?.points()[0][0], 180.0);
        assert_eq!(store.load_info()?.num_captures, 3);

        let (index, cloud) = &scans.views()[1];
        assert_eq!(*index, 1);
        assert_eq!(cloud.points()[0][0], 90.0);
        Ok(())
    }

    #[test]
    fn test_capture_error() {
        let mut store = MemoryCloudStore::new();
        let result = ScanSession::default().run(&mut Broken, &mut store);
        assert!(matches!(result, Err(SpinscanError::Capture(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalid_params() {
        let session = ScanSession::new(ScanParams {
            num_steps: 0,
            num_captures: None,
        });
        let mut store = MemoryCloudStore::new();
        assert!(matches!(
            session.run(&mut Broken, &mut store),
            Err(SpinscanError::InvalidConfig(_))
        ));
    }
}
