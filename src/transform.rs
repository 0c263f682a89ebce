//! Sensor-local polar returns to the flat world frame.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};

use crate::config::SensorPoseConfig;
use crate::types::{Frame, PolarPoint, WorldPoint};

/// Applies the sensor mounting pose to polar returns.
#[derive(Debug, Clone)]
pub struct WorldTransformer {
    pose: Isometry3<f64>,
    /// (sin, cos) of each ring's elevation angle
    ring_trig: Vec<(f64, f64)>,
}

impl WorldTransformer {
    pub fn new(config: &SensorPoseConfig, rings: usize) -> Self {
        let [tx, ty, tz] = config.translation;
        let pose = Isometry3::from_parts(
            Translation3::new(tx, ty, tz),
            UnitQuaternion::from_euler_angles(config.roll, config.pitch, config.yaw),
        );

        let elevations: Vec<f64> = if config.ring_elevations_deg.len() == rings {
            config.ring_elevations_deg.clone()
        } else if rings > 1 {
            let step = (config.elevation_max_deg - config.elevation_min_deg) / (rings - 1) as f64;
            (0..rings)
                .map(|r| config.elevation_min_deg + step * r as f64)
                .collect()
        } else {
            vec![0.0; rings]
        };

        let ring_trig = elevations
            .iter()
            .map(|deg| deg.to_radians().sin_cos())
            .collect();

        Self { pose, ring_trig }
    }

    pub fn pose(&self) -> &Isometry3<f64> {
        &self.pose
    }

    /// World position of a single return; `None` for an unknown ring.
    pub fn transform(&self, p: &PolarPoint) -> Option<WorldPoint> {
        let &(sin_el, cos_el) = self.ring_trig.get(usize::from(p.ring))?;
        let (sin_az, cos_az) = p.azimuth.sin_cos();
        let horizontal = p.range * cos_el;
        let local = Point3::new(horizontal * cos_az, horizontal * sin_az, p.range * sin_el);
        let world = self.pose * local;
        Some(WorldPoint::new(world.x, world.y, world.z, p.intensity))
    }

    /// Transform the masked points of a frame into `out` (cleared first).
    pub fn transform_masked(&self, frame: &Frame, mask: &[bool], out: &mut Vec<WorldPoint>) {
        out.clear();
        out.extend(
            frame
                .points
                .iter()
                .zip(mask)
                .filter(|(_, fg)| **fg)
                .filter_map(|(p, _)| self.transform(p)),
        );
    }
}
