use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};
use spinscan_3d::{
    calibration::CalibrationParams, filter::FilterParams, segmentation::PlaneSegmentationParams,
};
use spinscan_icp::RegistrationParams;

use crate::SpinscanError;

/// How a revolution is captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
    /// Number of table steps per full revolution.
    pub num_steps: usize,
    /// Number of captures, one per step. `None` captures the full revolution.
    pub num_captures: Option<usize>,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            num_steps: 8,
            num_captures: None,
        }
    }
}

impl ScanParams {
    /// Check that the parameters describe a feasible capture.
    pub fn validate(&self) -> Result<(), SpinscanError> {
        if self.num_steps == 0 {
            return Err(SpinscanError::InvalidConfig(
                "number of steps must be positive".into(),
            ));
        }
        if let Some(n) = self.num_captures {
            if n == 0 || n > self.num_steps {
                return Err(SpinscanError::InvalidConfig(format!(
                    "number of captures must be in [1, {}], got {}",
                    self.num_steps, n
                )));
            }
        }
        Ok(())
    }

    /// The table rotation between two captures, in degrees.
    pub fn degrees_per_step(&self) -> f64 {
        360.0 / self.num_steps as f64
    }

    /// Number of captures to take.
    pub fn num_captures(&self) -> usize {
        self.num_captures.unwrap_or(self.num_steps)
    }
}

/// Configuration of the whole scanner pipeline.
///
/// Every section falls back to its defaults when missing from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Crop box and downsampling of raw captures.
    pub filter: FilterParams,
    /// Removal of the scanning bed from operational scans.
    pub segmentation: PlaneSegmentationParams,
    /// Axis and center estimation.
    pub calibration: CalibrationParams,
    /// Multi-view registration.
    pub registration: RegistrationParams,
    /// Capture of a revolution.
    pub scan: ScanParams,
}

impl PipelineConfig {
    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SpinscanError> {
        let file = File::open(path.as_ref())?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Write the configuration to a JSON file.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), SpinscanError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
