use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_REBUILD_STRIDE: usize = 60;
pub const DEFAULT_SPEED_MIN: f64 = 0.1;
pub const DEFAULT_SPEED_MAX: f64 = 3.0;
pub const DEFAULT_WORLD_SCALE_X: f32 = 80.0;
pub const DEFAULT_WORLD_SCALE_Z: f32 = 60.0;
pub const DEFAULT_GROUND_EXTENT: f32 = 100.0;
pub const DEFAULT_MIN_VEHICLE_FOOTPRINT: f32 = 0.8;
pub const DEFAULT_VEHICLE_HEIGHT: f32 = 1.5;
pub const DEFAULT_LANE_ELEVATION: f32 = 0.05;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("rebuild_stride must be at least 1")]
    ZeroStride,
    #[error("speed range [{min}, {max}] must be positive and ordered")]
    SpeedRange { min: f64, max: f64 },
    #[error("{field} must be a positive finite number (got {value})")]
    NonPositive { field: &'static str, value: f32 },
    #[error("mapped extent {extent_x}x{extent_z} does not fit on a ground plane of {ground}")]
    ExtentOutsideGround {
        extent_x: f32,
        extent_z: f32,
        ground: f32,
    },
}

/// Tunables for the replay engine. Every field may be omitted from a config
/// file; missing fields take the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub rebuild_stride: usize,
    pub speed_min: f64,
    pub speed_max: f64,
    pub world_scale_x: f32,
    pub world_scale_z: f32,
    pub ground_extent: f32,
    pub min_vehicle_footprint: f32,
    pub vehicle_height: f32,
    pub lane_elevation: f32,
    pub autoplay: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            rebuild_stride: DEFAULT_REBUILD_STRIDE,
            speed_min: DEFAULT_SPEED_MIN,
            speed_max: DEFAULT_SPEED_MAX,
            world_scale_x: DEFAULT_WORLD_SCALE_X,
            world_scale_z: DEFAULT_WORLD_SCALE_Z,
            ground_extent: DEFAULT_GROUND_EXTENT,
            min_vehicle_footprint: DEFAULT_MIN_VEHICLE_FOOTPRINT,
            vehicle_height: DEFAULT_VEHICLE_HEIGHT,
            lane_elevation: DEFAULT_LANE_ELEVATION,
            autoplay: true,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rebuild_stride == 0 {
            return Err(ConfigError::ZeroStride);
        }
        if !self.speed_range_usable() {
            return Err(ConfigError::SpeedRange {
                min: self.speed_min,
                max: self.speed_max,
            });
        }

        for (field, value) in [
            ("world_scale_x", self.world_scale_x),
            ("world_scale_z", self.world_scale_z),
            ("ground_extent", self.ground_extent),
            ("min_vehicle_footprint", self.min_vehicle_footprint),
            ("vehicle_height", self.vehicle_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if !self.lane_elevation.is_finite() || self.lane_elevation < 0.0 {
            return Err(ConfigError::NonPositive {
                field: "lane_elevation",
                value: self.lane_elevation,
            });
        }

        if self.world_scale_x > self.ground_extent || self.world_scale_z > self.ground_extent {
            return Err(ConfigError::ExtentOutsideGround {
                extent_x: self.world_scale_x,
                extent_z: self.world_scale_z,
                ground: self.ground_extent,
            });
        }
        Ok(())
    }

    /// Clamp into the configured speed range. An unusable range (unordered,
    /// non-positive or non-finite) falls back to the default bounds.
    pub fn clamp_speed(&self, multiplier: f64) -> f64 {
        let (min, max) = self.speed_bounds();
        multiplier.max(min).min(max)
    }

    fn speed_range_usable(&self) -> bool {
        self.speed_min.is_finite()
            && self.speed_max.is_finite()
            && self.speed_min > 0.0
            && self.speed_min <= self.speed_max
    }

    fn speed_bounds(&self) -> (f64, f64) {
        if self.speed_range_usable() {
            (self.speed_min, self.speed_max)
        } else {
            (DEFAULT_SPEED_MIN, DEFAULT_SPEED_MAX)
        }
    }
}
