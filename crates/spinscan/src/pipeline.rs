use spinscan_3d::{
    calibration::{calibrate_from_planes, CalibrationParams, CalibrationResult},
    filter::{condition, FilterError, FilterParams},
    pointcloud::PointCloud,
    segmentation::{extract_all, remove_dominant_plane, SegmentationError},
};
use spinscan_icp::{register_views, RegisteredModel, ScanSet};

use crate::{
    store::{CloudStore, CloudType},
    PipelineConfig, SpinscanError,
};

/// Calibrate the turntable from raw captures of the calibration target.
///
/// Each capture is conditioned and split into planes, largest first. The
/// largest plane is taken as the table surface and the others as upright
/// walls of the target. Captures left empty by the crop or without any plane
/// are skipped.
///
/// # Arguments
///
/// * `clouds` - Raw captures in the camera frame, one per table step.
/// * `filter` - Conditioning applied to every capture.
/// * `params` - The calibration parameters.
pub fn calibrate_from_clouds(
    clouds: &[PointCloud],
    filter: &FilterParams,
    params: &CalibrationParams,
) -> Result<CalibrationResult, SpinscanError> {
    let mut captures = Vec::with_capacity(clouds.len());
    for (i, cloud) in clouds.iter().enumerate() {
        let filtered = match condition(cloud, filter) {
            Ok(filtered) => filtered,
            Err(FilterError::EmptyCloud) => {
                log::warn!("Capture {}: no valid point inside the crop box, skipping", i);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        match extract_all(&filtered, &params.segmentation) {
            Ok(planes) => {
                log::debug!("Capture {}: {} planes", i, planes.len());
                captures.push(planes);
            }
            Err(SegmentationError::NoPlaneFound | SegmentationError::EmptyCloud) => {
                log::warn!("Capture {}: no plane found, skipping", i);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(calibrate_from_planes(&captures, params)?)
}

/// Process the raw clouds of a stored scan into a registered model.
///
/// For every capture listed in the scan metadata the raw cloud is cropped and
/// downsampled (saved as filtered), the scanning bed is removed (saved as
/// segmented) and the result is brought to the world frame. The views are then
/// registered and the merged model is saved as registered under `scan_name`.
///
/// # Arguments
///
/// * `store` - Store holding the raw clouds and the scan metadata.
/// * `scan_name` - Name of the merged model.
/// * `calibration` - The turntable calibration.
/// * `config` - The pipeline configuration.
pub fn process_scan(
    store: &mut impl CloudStore,
    scan_name: &str,
    calibration: &CalibrationResult,
    config: &PipelineConfig,
) -> Result<RegisteredModel, SpinscanError> {
    let info = store.load_info()?;
    let mut scans = ScanSet::new(info.num_steps);

    for i in 0..info.num_captures {
        let name = info.cloud_name(i);
        let raw = store.load(&name, CloudType::Raw)?;

        let filtered = condition(&raw, &config.filter)?;
        store.save(&filtered, &name, CloudType::Filtered)?;

        let segmented = remove_dominant_plane(&filtered, &config.segmentation)?;
        store.save(&segmented, &name, CloudType::Segmented)?;

        scans.push(i, calibration.apply(&segmented)?);
    }

    let model = register_views(&scans, &config.registration)?;
    store.save(&model.cloud, scan_name, CloudType::Registered)?;

    log::info!(
        "Scan {}: {} views merged into {} points, {} degraded",
        scan_name,
        model.views.len(),
        model.cloud.len(),
        model.warnings.len()
    );

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinscan_3d::{calibration::CalibrationError, pointcloud::INVALID_POINT};

    #[test]
    fn test_calibrate_skips_empty_captures() -> Result<(), Box<dyn std::error::Error>> {
        let clouds = [
            PointCloud::new_organized(vec![INVALID_POINT; 4], 2, 2)?,
            PointCloud::new(vec![[5.0, 0.0, 0.2]]),
        ];
        let result = calibrate_from_clouds(
            &clouds,
            &FilterParams::default(),
            &CalibrationParams::default(),
        );
        // nothing left to estimate the axis from
        assert!(matches!(
            result,
            Err(SpinscanError::Calibration(CalibrationError::DegenerateAxis))
        ));
        Ok(())
    }
}
