use clap::ValueEnum;
use glam::{Mat4, Vec3};

const FOV_Y_DEGREES: f32 = 50.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 500.0;

/// Fixed viewpoints over the reconstructed scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CameraPreset {
    /// High three-quarter view of the whole scene.
    Overview,
    /// Trails the first visible vehicle.
    Follow,
    /// Low view from the left edge of the road.
    Side,
}

impl CameraPreset {
    pub fn next(self) -> Self {
        match self {
            CameraPreset::Overview => CameraPreset::Follow,
            CameraPreset::Follow => CameraPreset::Side,
            CameraPreset::Side => CameraPreset::Overview,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CameraPreset::Overview => "overview",
            CameraPreset::Follow => "follow",
            CameraPreset::Side => "side",
        }
    }

    /// Eye and look-at target. `focus` only matters for `Follow`.
    pub fn eye_and_target(self, focus: Vec3) -> (Vec3, Vec3) {
        match self {
            CameraPreset::Overview => (Vec3::new(0.0, 70.0, 55.0), Vec3::ZERO),
            CameraPreset::Follow => (focus + Vec3::new(0.0, 12.0, 18.0), focus),
            CameraPreset::Side => (Vec3::new(-70.0, 18.0, 0.0), Vec3::ZERO),
        }
    }

    pub fn view_projection(self, aspect: f32, focus: Vec3) -> Mat4 {
        let (eye, target) = self.eye_and_target(focus);
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        let projection = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, NEAR, FAR);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        projection * view
    }
}
