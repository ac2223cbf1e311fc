use approx::assert_relative_eq;
use spinscan::{
    icp::RotationDirection,
    process_scan,
    s3d::{
        calibration::{CalibrationResult, RotationAxis},
        pointcloud::PointCloud,
    },
    synthetic::{pitched_axis, SyntheticScene, SyntheticTurntable},
    CalibrationSession, CloudStore, CloudType, FileCloudStore, MemoryCloudStore, PipelineConfig,
    ScanParams, ScanSession, SpinscanError,
};

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.filter.leaf_size = None;
    config.segmentation.random_seed = Some(0);
    config.calibration.segmentation.random_seed = Some(1);
    config
}

fn calibrate(
    axis: &RotationAxis,
    config: &PipelineConfig,
    store: &mut impl CloudStore,
) -> Result<CalibrationResult, SpinscanError> {
    let mut turntable = SyntheticTurntable::new(
        SyntheticScene::calibration_target(10),
        axis,
        RotationDirection::Clockwise,
    );
    let session = CalibrationSession::new(ScanParams {
        num_steps: 12,
        num_captures: Some(4),
    });
    session.run(&mut turntable, store, config)
}

#[test]
fn test_calibration_session() -> Result<(), Box<dyn std::error::Error>> {
    let axis = pitched_axis(30.0, 0.35)?;
    let config = test_config();
    let mut store = MemoryCloudStore::new();

    let calibration = calibrate(&axis, &config, &mut store)?;

    let expected = axis.direction.as_array();
    let estimated = calibration.axis.direction.as_array();
    for i in 0..3 {
        assert_relative_eq!(estimated[i], expected[i], epsilon = 1e-6);
        assert_relative_eq!(calibration.axis.center[i], axis.center[i], epsilon = 1e-6);
    }
    // one ground anchor and at least one wall per capture
    assert!(calibration.num_equations >= 5);

    assert_eq!(store.names(CloudType::Raw), vec!["0", "30", "60", "90"]);
    assert_eq!(store.load_calibration()?, calibration);
    Ok(())
}

#[test]
fn test_full_pipeline() -> Result<(), Box<dyn std::error::Error>> {
    let axis = pitched_axis(30.0, 0.35)?;
    let config = test_config();

    let tmp_dir = tempfile::tempdir()?;
    let mut calibration_store = FileCloudStore::new(tmp_dir.path().join("calibration"));
    calibrate(&axis, &config, &mut calibration_store)?;
    // reload as a later session would
    let calibration = calibration_store.load_calibration()?;

    let scene = SyntheticScene::object(20);
    let object = scene.rotating.clone();
    let mut turntable = SyntheticTurntable::new(scene, &axis, RotationDirection::Clockwise);
    let mut scan_store = FileCloudStore::new(tmp_dir.path().join("mug"));
    let scans = ScanSession::new(config.scan.clone()).run(&mut turntable, &mut scan_store)?;
    assert_eq!(scans.len(), 8);
    assert_relative_eq!(turntable.angle_deg(), 360.0);

    let model = process_scan(&mut scan_store, "mug", &calibration, &config)?;

    assert!(!model.is_degraded());
    assert_eq!(model.views.len(), 8);
    for view in &model.views {
        // the bed is removed, only the object is left
        assert_eq!(view.num_points, object.len());
    }
    assert_eq!(model.cloud.len(), 8 * object.len());

    let increments = model.angular_increments();
    assert_relative_eq!(increments.iter().sum::<f64>(), 360.0, epsilon = 1e-6);
    for inc in increments {
        assert_relative_eq!(inc, 45.0, epsilon = 0.1);
    }

    // the merged model sits where the object stood at the first capture
    let expected = PointCloud::new(object).centroid().ok_or("empty object")?;
    let centroid = model.cloud.centroid().ok_or("empty model")?;
    for i in 0..3 {
        assert_relative_eq!(centroid[i], expected[i], epsilon = 1e-3);
    }

    let stored = scan_store.load("mug", CloudType::Registered)?;
    assert_eq!(stored.len(), model.cloud.len());
    assert_eq!(scan_store.load("135", CloudType::Segmented)?.len(), 1000);
    assert!(tmp_dir.path().join("mug").join("filtered").join("315.pcd").exists());
    Ok(())
}

#[test]
fn test_process_scan_without_scan() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = MemoryCloudStore::new();
    let calibration = CalibrationResult::new(pitched_axis(30.0, 0.35)?, 0, 0.0);
    let result = process_scan(&mut store, "missing", &calibration, &PipelineConfig::default());
    assert!(matches!(result, Err(SpinscanError::MissingMetadata(_))));
    Ok(())
}
