use argh::FromArgs;
use std::path::PathBuf;

use spinscan::{
    icp::RotationDirection,
    process_scan,
    synthetic::{pitched_axis, SyntheticScene, SyntheticTurntable},
    CalibrationSession, CloudStore, FileCloudStore, MemoryCloudStore, PipelineConfig, ScanParams,
    ScanSession,
};

#[derive(FromArgs)]
/// Calibrate a simulated turntable, scan a synthetic object and register the views
struct Args {
    /// path to a JSON pipeline configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// directory to store clouds and metadata in, kept in memory if not set
    #[argh(option)]
    output: Option<PathBuf>,

    /// number of table steps per revolution, overrides the configuration (default 8)
    #[argh(option)]
    num_steps: Option<usize>,

    /// camera pitch in degrees
    #[argh(option, default = "30.0")]
    pitch: f64,

    /// seed of the synthetic scenes
    #[argh(option, default = "0")]
    seed: u64,
}

fn run(
    args: &Args,
    config: &PipelineConfig,
    calibration_store: &mut impl CloudStore,
    scan_store: &mut impl CloudStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let axis = pitched_axis(args.pitch, 0.35)?;
    let direction = config.registration.direction;

    let mut turntable = SyntheticTurntable::new(
        SyntheticScene::calibration_target(args.seed),
        &axis,
        direction,
    );
    let calibration = CalibrationSession::new(ScanParams {
        num_steps: 12,
        num_captures: Some(4),
    })
    .run(&mut turntable, calibration_store, config)?;

    println!(
        "Calibrated axis {:?} (true {:?}), center {:?} (true {:?})",
        calibration.axis.direction.as_array(),
        axis.direction.as_array(),
        calibration.axis.center,
        axis.center
    );

    let mut turntable = SyntheticTurntable::new(
        SyntheticScene::object(args.seed.wrapping_add(1)),
        &axis,
        direction,
    );
    ScanSession::new(config.scan.clone()).run(&mut turntable, scan_store)?;

    let model = process_scan(scan_store, "object", &calibration, config)?;

    println!(
        "Registered {} views into {} points",
        model.views.len(),
        model.cloud.len()
    );
    for (view, increment) in model.views.iter().zip(model.angular_increments()) {
        println!(
            "view {:>3}: yaw {:>8.3} deg, next step {:>7.3} deg{}",
            view.angle_index,
            view.refined_yaw_deg,
            increment,
            if view.degraded { " (degraded)" } else { "" }
        );
    }
    for warning in &model.warnings {
        log::warn!("{:?}", warning);
    }

    Ok(())
}

/// Load the configuration file if any, then apply the command line overrides.
fn load_config(args: &Args) -> Result<PipelineConfig, spinscan::SpinscanError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => {
            let mut config = PipelineConfig::default();
            // the synthetic scenes are noise free
            config.filter.leaf_size = None;
            config
        }
    };
    if let Some(num_steps) = args.num_steps {
        config.scan.num_steps = num_steps;
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();
    let config = load_config(&args)?;

    match &args.output {
        Some(dir) => {
            let mut calibration_store = FileCloudStore::new(dir.join("calibration"));
            let mut scan_store = FileCloudStore::new(dir.join("scan"));
            run(&args, &config, &mut calibration_store, &mut scan_store)?;
            config.to_json_file(dir.join("config.json"))?;
            println!("Saved clouds to {}", dir.display());
        }
        None => {
            let mut calibration_store = MemoryCloudStore::new();
            let mut scan_store = MemoryCloudStore::new();
            run(&args, &config, &mut calibration_store, &mut scan_store)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(config: Option<PathBuf>, num_steps: Option<usize>) -> Args {
        Args {
            config,
            output: None,
            num_steps,
            pitch: 30.0,
            seed: 0,
        }
    }

    #[test]
    fn test_num_steps_overrides_config_file() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = tempfile::tempdir()?;
        let path = tmp_dir.path().join("config.json");
        let mut stored = PipelineConfig::default();
        stored.scan.num_steps = 6;
        stored.to_json_file(&path)?;

        assert_eq!(load_config(&args(Some(path.clone()), None))?.scan.num_steps, 6);
        assert_eq!(load_config(&args(Some(path), Some(12)))?.scan.num_steps, 12);

        let defaults = load_config(&args(None, None))?;
        assert_eq!(defaults.scan.num_steps, 8);
        assert_eq!(defaults.filter.leaf_size, None);
        Ok(())
    }
}
