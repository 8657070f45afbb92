//! Normalized image space to world ground-plane mapping.
//!
//! Image `x` grows to the right and `y` grows downward; the world uses `x` to
//! the right and `z` away from the camera, so the vertical axis flips. The
//! image center lands on the world origin.

use glam::Vec3;

use crate::config::ReplayConfig;

/// A point on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    pub x: f32,
    pub z: f32,
}

impl WorldPoint {
    pub fn at_elevation(self, y: f32) -> Vec3 {
        Vec3::new(self.x, y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldMapper {
    scale_x: f32,
    scale_z: f32,
}

impl WorldMapper {
    pub fn new(scale_x: f32, scale_z: f32) -> Self {
        Self { scale_x, scale_z }
    }

    pub fn from_config(config: &ReplayConfig) -> Self {
        Self::new(config.world_scale_x, config.world_scale_z)
    }

    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    pub fn scale_z(&self) -> f32 {
        self.scale_z
    }

    /// Affine map; inputs outside [0, 1] extrapolate linearly.
    pub fn to_world(&self, normalized_x: f64, normalized_y: f64) -> WorldPoint {
        WorldPoint {
            x: ((normalized_x - 0.5) * f64::from(self.scale_x)) as f32,
            z: ((0.5 - normalized_y) * f64::from(self.scale_z)) as f32,
        }
    }
}

impl Default for WorldMapper {
    fn default() -> Self {
        Self::from_config(&ReplayConfig::default())
    }
}
