//! A turntable simulator producing noise-free captures of synthetic scenes.
//!
//! Scenes are built in the world frame, with the turntable axis along +Z and
//! the table surface at `z = 0`. The simulated camera sees them through the
//! inverse of a known calibration, so the pipelines can be checked against
//! ground truth.

use rand::{rngs::StdRng, Rng, SeedableRng};
use spinscan_3d::{
    calibration::{build_transform, RotationAxis},
    plane::{PlaneError, UnitVector},
    pointcloud::PointCloud,
    transforms::RigidTransform,
};
use spinscan_icp::RotationDirection;

use crate::session::{CaptureError, TurntableCapture};

/// Radius of the simulated table.
pub const TABLE_RADIUS: f64 = 0.12;

/// Points of a synthetic scene in the world frame.
#[derive(Debug, Clone, Default)]
pub struct SyntheticScene {
    /// Points that do not move with the table.
    pub fixed: Vec<[f64; 3]>,
    /// Points that turn with the table.
    pub rotating: Vec<[f64; 3]>,
}

fn table_points(rng: &mut StdRng, num_points: usize) -> Vec<[f64; 3]> {
    (0..num_points)
        .map(|_| {
            let r = TABLE_RADIUS * rng.random_range(0.0..1.0f64).sqrt();
            let theta = rng.random_range(0.0..std::f64::consts::TAU);
            [r * theta.cos(), r * theta.sin(), 0.0]
        })
        .collect()
}

fn box_points(
    rng: &mut StdRng,
    min: [f64; 3],
    max: [f64; 3],
    num_points: usize,
) -> Vec<[f64; 3]> {
    (0..num_points)
        .map(|_| {
            [
                rng.random_range(min[0]..=max[0]),
                rng.random_range(min[1]..=max[1]),
                rng.random_range(min[2]..=max[2]),
            ]
        })
        .collect()
}

impl SyntheticScene {
    /// The table with a calibration target made of two perpendicular walls
    /// meeting on the rotation axis.
    pub fn calibration_target(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let fixed = table_points(&mut rng, 3000);
        let mut rotating = box_points(&mut rng, [-0.09, 0.0, 0.02], [0.09, 0.0, 0.14], 1500);
        rotating.extend(box_points(
            &mut rng,
            [0.0, 0.02, 0.02],
            [0.0, 0.09, 0.14],
            900,
        ));
        Self { fixed, rotating }
    }

    /// The table with an asymmetric object: a block with a post on one corner.
    pub fn object(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let fixed = table_points(&mut rng, 3000);
        let mut rotating = box_points(&mut rng, [-0.04, -0.03, 0.02], [0.05, 0.03, 0.07], 800);
        rotating.extend(box_points(
            &mut rng,
            [0.03, 0.02, 0.07],
            [0.05, 0.04, 0.13],
            200,
        ));
        Self { fixed, rotating }
    }
}

/// A rotation axis seen by a camera pitched down by `pitch_deg` degrees,
/// with the table center `distance` meters in front of it.
pub fn pitched_axis(pitch_deg: f64, distance: f64) -> Result<RotationAxis, PlaneError> {
    let pitch = pitch_deg.to_radians();
    Ok(RotationAxis {
        direction: UnitVector::new([0.0, -pitch.cos(), -pitch.sin()])?,
        center: [0.0, 0.02, distance],
    })
}

/// A simulated camera and turntable.
#[derive(Debug, Clone)]
pub struct SyntheticTurntable {
    scene: SyntheticScene,
    camera_from_world: RigidTransform,
    direction: RotationDirection,
    angle_deg: f64,
}

impl SyntheticTurntable {
    /// Simulate a turntable whose true rotation axis in the camera frame is `axis`.
    pub fn new(scene: SyntheticScene, axis: &RotationAxis, direction: RotationDirection) -> Self {
        Self {
            scene,
            camera_from_world: build_transform(axis).inverse(),
            direction,
            angle_deg: 0.0,
        }
    }

    /// The accumulated table rotation in degrees.
    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    /// The scene points at the current table angle, in the world frame.
    pub fn world_points(&self) -> Vec<[f64; 3]> {
        // the table turning clockwise seen from above is a negative yaw
        let yaw = -self.direction.alignment_sign() * self.angle_deg.to_radians();
        let table = RigidTransform::from_yaw(yaw);
        self.scene
            .fixed
            .iter()
            .copied()
            .chain(self.scene.rotating.iter().map(|p| table.apply_point(p)))
            .collect()
    }
}

impl TurntableCapture for SyntheticTurntable {
    fn capture(&mut self) -> Result<PointCloud, CaptureError> {
        Ok(self
            .camera_from_world
            .apply(&PointCloud::new(self.world_points()))?)
    }

    fn rotate_by(&mut self, degrees: f64) -> Result<(), CaptureError> {
        self.angle_deg += degrees;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use spinscan_3d::calibration::CalibrationResult;

    #[test]
    fn test_capture_in_camera_frame() -> Result<(), Box<dyn std::error::Error>> {
        let axis = pitched_axis(30.0, 0.35)?;
        let mut turntable = SyntheticTurntable::new(
            SyntheticScene::object(0),
            &axis,
            RotationDirection::Clockwise,
        );

        let cloud = turntable.capture().map_err(|e| e.to_string())?;
        assert_eq!(cloud.len(), 4000);

        // the calibration brings the capture back to the world frame
        let world = CalibrationResult::new(axis, 0, 0.0).apply(&cloud)?;
        for (a, b) in world.points().iter().zip(turntable.world_points()) {
            for i in 0..3 {
                assert_relative_eq!(a[i], b[i], epsilon = 1e-9);
            }
        }
        Ok(())
    }

    #[test]
    fn test_rotation_moves_only_the_object() -> Result<(), Box<dyn std::error::Error>> {
        let scene = SyntheticScene::object(1);
        let mut turntable = SyntheticTurntable::new(
            scene.clone(),
            &pitched_axis(30.0, 0.35)?,
            RotationDirection::Clockwise,
        );
        turntable.rotate_by(90.0).map_err(|e| e.to_string())?;
        assert_eq!(turntable.angle_deg(), 90.0);

        let points = turntable.world_points();
        assert_eq!(&points[..scene.fixed.len()], scene.fixed.as_slice());

        // clockwise from above: +X goes to -Y
        let p = scene.rotating[0];
        let q = points[scene.fixed.len()];
        assert_relative_eq!(q[0], p[1], epsilon = 1e-12);
        assert_relative_eq!(q[1], -p[0], epsilon = 1e-12);
        assert_relative_eq!(q[2], p[2], epsilon = 1e-12);
        Ok(())
    }
}
