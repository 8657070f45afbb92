//! Keyboard bindings for the replay window.

use winit::keyboard::{Key, NamedKey};

use crate::camera::CameraPreset;

const SEEK_STEP: f64 = 0.05;
const SPEED_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerCommand {
    TogglePlay,
    /// Restart playback, or retry a failed load.
    Restart,
    SeekBy(f64),
    SpeedBy(f64),
    ToggleLanes,
    ToggleRoad,
    CycleCamera,
    SetCamera(CameraPreset),
    Quit,
}

pub fn command_for_key(key: &Key) -> Option<ViewerCommand> {
    match key {
        Key::Named(NamedKey::Space) => Some(ViewerCommand::TogglePlay),
        Key::Named(NamedKey::ArrowLeft) => Some(ViewerCommand::SeekBy(-SEEK_STEP)),
        Key::Named(NamedKey::ArrowRight) => Some(ViewerCommand::SeekBy(SEEK_STEP)),
        Key::Named(NamedKey::ArrowUp) => Some(ViewerCommand::SpeedBy(SPEED_STEP)),
        Key::Named(NamedKey::ArrowDown) => Some(ViewerCommand::SpeedBy(-SPEED_STEP)),
        Key::Named(NamedKey::Escape) => Some(ViewerCommand::Quit),
        Key::Character(text) => match text.to_ascii_lowercase().as_str() {
            " " => Some(ViewerCommand::TogglePlay),
            "r" => Some(ViewerCommand::Restart),
            "l" => Some(ViewerCommand::ToggleLanes),
            "g" => Some(ViewerCommand::ToggleRoad),
            "c" => Some(ViewerCommand::CycleCamera),
            "1" => Some(ViewerCommand::SetCamera(CameraPreset::Overview)),
            "2" => Some(ViewerCommand::SetCamera(CameraPreset::Follow)),
            "3" => Some(ViewerCommand::SetCamera(CameraPreset::Side)),
            _ => None,
        },
        _ => None,
    }
}

pub const KEY_HELP: &str =
    "Space play/pause  R restart  Left/Right seek  Up/Down speed  L lanes  G road  C/1-3 camera";

#[cfg(test)]
mod tests {
    use super::*;

    fn character(text: &str) -> Key {
        Key::Character(text.into())
    }

    #[test]
    fn transport_keys() {
        assert_eq!(
            command_for_key(&Key::Named(NamedKey::Space)),
            Some(ViewerCommand::TogglePlay)
        );
        assert_eq!(command_for_key(&character("R")), Some(ViewerCommand::Restart));
        assert_eq!(
            command_for_key(&Key::Named(NamedKey::ArrowLeft)),
            Some(ViewerCommand::SeekBy(-0.05))
        );
        assert_eq!(
            command_for_key(&Key::Named(NamedKey::ArrowUp)),
            Some(ViewerCommand::SpeedBy(0.1))
        );
    }

    #[test]
    fn layer_and_camera_keys() {
        assert_eq!(command_for_key(&character("l")), Some(ViewerCommand::ToggleLanes));
        assert_eq!(command_for_key(&character("G")), Some(ViewerCommand::ToggleRoad));
        assert_eq!(command_for_key(&character("c")), Some(ViewerCommand::CycleCamera));
        assert_eq!(
            command_for_key(&character("3")),
            Some(ViewerCommand::SetCamera(CameraPreset::Side))
        );
    }

    #[test]
    fn unbound_keys_are_ignored() {
        assert_eq!(command_for_key(&character("q")), None);
        assert_eq!(command_for_key(&Key::Named(NamedKey::Tab)), None);
    }
}
