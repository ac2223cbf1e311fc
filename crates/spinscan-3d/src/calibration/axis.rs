use glam::DVec3;

use super::CalibrationError;
use crate::plane::{Plane, UnitVector};

/// Default "up" hint in the camera frame, the camera -Y axis.
pub const DEFAULT_UP_HINT: [f64; 3] = [0.0, -1.0, 0.0];

/// Smallest accepted magnitude of the averaged ground normal.
pub const AXIS_EPSILON: f64 = 1e-9;

/// Estimate the turntable rotation axis from ground plane observations.
///
/// Equivalent to [`estimate_axis_with_hint`] with [`DEFAULT_UP_HINT`].
pub fn estimate_axis(ground_planes: &[Plane]) -> Result<UnitVector, CalibrationError> {
    estimate_axis_with_hint(ground_planes, &DEFAULT_UP_HINT)
}

/// Estimate the turntable rotation axis from ground plane observations.
///
/// Every unit normal is flipped to agree with the first one before averaging.
/// The sign of the normalized mean is then chosen so that it points along
/// `up_hint`, which makes the result independent of the sign of every input
/// normal.
///
/// # Arguments
///
/// * `ground_planes` - The table surface observed in each calibration capture.
/// * `up_hint` - A rough direction of "up" in the camera frame.
///
/// # Errors
///
/// [`CalibrationError::DegenerateAxis`] if no plane is given or the mean normal vanishes,
/// [`CalibrationError::InvalidPlane`] if a plane has no usable normal.
pub fn estimate_axis_with_hint(
    ground_planes: &[Plane],
    up_hint: &[f64; 3],
) -> Result<UnitVector, CalibrationError> {
    let first = ground_planes
        .first()
        .ok_or(CalibrationError::DegenerateAxis)?
        .unit_normal()?
        .as_dvec3();

    let mut sum = DVec3::ZERO;
    for plane in ground_planes {
        let n = plane.unit_normal()?.as_dvec3();
        if n.dot(first) < 0.0 {
            sum -= n;
        } else {
            sum += n;
        }
    }

    let mean = sum / ground_planes.len() as f64;
    if !mean.is_finite() || mean.length() < AXIS_EPSILON {
        return Err(CalibrationError::DegenerateAxis);
    }

    let axis = UnitVector::new(mean.to_array())?;
    let axis = if axis.dot(up_hint) < 0.0 {
        axis.flipped()
    } else {
        axis
    };

    log::debug!(
        "Estimated rotation axis {:?} from {} ground planes",
        axis.as_array(),
        ground_planes.len()
    );

    Ok(axis)
}
