//! Window-independent application state: owns the scene table, the loaded
//! controller (or the load error), and the camera preset.

use std::path::PathBuf;

use glam::{Mat4, Vec3};
use replay_core::{
    PerceptionRecord, PlaybackController, ReplayConfig, SceneHost, SurfaceMesh, TickReport,
};

use crate::camera::CameraPreset;
use crate::input::{KEY_HELP, ViewerCommand};
use crate::scene_table::SceneTable;

/// Longest real delta fed to the controller in one redraw.
pub const MAX_FRAME_DELTA: f64 = 0.25;

const GROUND_COLOR: [f32; 3] = [0.13, 0.15, 0.13];
const GROUND_DEPTH: f32 = -0.02;
const GROUND_MARGIN: f32 = 1.5;

pub enum LoadState {
    Loaded(Box<PlaybackController>),
    Failed(String),
}

pub struct ReplayApp {
    record_path: PathBuf,
    config: ReplayConfig,
    table: SceneTable,
    load: LoadState,
    camera: CameraPreset,
    start_percent: Option<f64>,
}

impl ReplayApp {
    pub fn new(
        record_path: PathBuf,
        config: ReplayConfig,
        camera: CameraPreset,
        start_percent: Option<f64>,
    ) -> Self {
        let mut app = Self {
            record_path,
            config,
            table: SceneTable::new(),
            load: LoadState::Failed(String::new()),
            camera,
            start_percent,
        };
        app.reload();
        app
    }

    /// Load the record from scratch. Any previous scene is dropped first so a
    /// failed load never leaves a partial scene on screen.
    pub fn reload(&mut self) {
        self.table = SceneTable::new();
        self.load = match PerceptionRecord::from_path(&self.record_path) {
            Ok(record) => {
                install_ground(&mut self.table, self.config.ground_extent);
                let mut controller = PlaybackController::new(record, self.config.clone());
                controller.activate(&mut self.table);
                if self.config.autoplay {
                    controller.play();
                }
                if let Some(percent) = self.start_percent {
                    controller.seek_percent(percent);
                }
                log::info!("scene ready with {} renderables", self.table.len());
                LoadState::Loaded(Box::new(controller))
            }
            Err(err) => {
                log::error!("failed to load {}: {err}", self.record_path.display());
                LoadState::Failed(err.to_string())
            }
        };
    }

    pub fn table(&self) -> &SceneTable {
        &self.table
    }

    pub fn camera(&self) -> CameraPreset {
        self.camera
    }

    pub fn controller(&self) -> Option<&PlaybackController> {
        match &self.load {
            LoadState::Loaded(controller) => Some(controller.as_ref()),
            LoadState::Failed(_) => None,
        }
    }

    pub fn load_error(&self) -> Option<&str> {
        match &self.load {
            LoadState::Loaded(_) => None,
            LoadState::Failed(message) => Some(message),
        }
    }

    /// Apply a key command. Returns `false` when the app should quit.
    pub fn handle(&mut self, command: ViewerCommand) -> bool {
        match command {
            ViewerCommand::Quit => return false,
            ViewerCommand::CycleCamera => self.camera = self.camera.next(),
            ViewerCommand::SetCamera(preset) => self.camera = preset,
            ViewerCommand::Restart if self.load_error().is_some() => {
                log::info!("retrying load of {}", self.record_path.display());
                self.reload();
            }
            _ => {
                let LoadState::Loaded(controller) = &mut self.load else {
                    return true;
                };
                let host = &mut self.table;
                match command {
                    ViewerCommand::TogglePlay => controller.toggle_play(),
                    ViewerCommand::Restart => controller.restart(host),
                    ViewerCommand::SeekBy(delta) => controller.seek_by(delta),
                    ViewerCommand::SpeedBy(delta) => controller.adjust_speed(delta),
                    ViewerCommand::ToggleLanes => controller.toggle_lanes(host),
                    ViewerCommand::ToggleRoad => controller.toggle_road(host),
                    ViewerCommand::Quit
                    | ViewerCommand::CycleCamera
                    | ViewerCommand::SetCamera(_) => {}
                }
            }
        }
        true
    }

    /// Advance playback by the real time since the last redraw.
    pub fn update(&mut self, real_delta: f64) -> Option<TickReport> {
        let LoadState::Loaded(controller) = &mut self.load else {
            return None;
        };
        let delta = if real_delta.is_finite() {
            real_delta.clamp(0.0, MAX_FRAME_DELTA)
        } else {
            0.0
        };
        Some(controller.tick(delta, &mut self.table))
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let focus = self
            .controller()
            .and_then(|controller| controller.vehicles().first_visible_position())
            .map(|position| Vec3::new(position.x, 0.0, position.z))
            .unwrap_or(Vec3::ZERO);
        self.camera.view_projection(aspect, focus)
    }

    pub fn hud_lines(&self) -> Vec<String> {
        match &self.load {
            LoadState::Failed(message) => vec![
                "Failed to load perception record:".to_string(),
                message.clone(),
                "Press R to retry, Esc to quit".to_string(),
            ],
            LoadState::Loaded(controller) => {
                let readout = controller.readout();
                let on_off = |flag: bool| if flag { "on" } else { "off" };
                vec![
                    readout.to_string(),
                    format!(
                        "Lanes {} | Road {} | Camera {}",
                        on_off(readout.lanes_visible),
                        on_off(readout.road_visible),
                        self.camera.label()
                    ),
                    KEY_HELP.to_string(),
                ]
            }
        }
    }
}

fn install_ground(host: &mut impl SceneHost, road_extent: f32) {
    let half = road_extent * GROUND_MARGIN / 2.0;
    let mesh = SurfaceMesh {
        vertices: vec![
            Vec3::new(-half, GROUND_DEPTH, -half),
            Vec3::new(half, GROUND_DEPTH, -half),
            Vec3::new(half, GROUND_DEPTH, half),
            Vec3::new(-half, GROUND_DEPTH, half),
        ],
        indices: vec![0, 1, 2, 0, 2, 3],
        color: GROUND_COLOR,
        double_sided: true,
    };
    if let Err(err) = host.create_surface(mesh) {
        log::warn!("ground plane unavailable: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::PlaybackState;
    use std::fs;
    use tempfile::tempdir;

    const RECORD: &str = r#"{
        "frames": {
            "1": {"vehicles": [{"class_id": 0, "center_x": 0.75, "center_y": 0.5, "width": 0.1, "height": 0.1}],
                  "lane_lines": [[[100, 700], [500, 400]]],
                  "drivable_area": [[0, 720], [600, 360], [680, 360], [1280, 720]]},
            "2": {"vehicles": []},
            "3": {"vehicles": []},
            "4": {"vehicles": []}
        },
        "metadata": {"fps": 1}
    }"#;

    #[test]
    fn failed_load_shows_retry_and_recovers() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("scene_data.json");
        let mut app = ReplayApp::new(
            path.clone(),
            ReplayConfig::default(),
            CameraPreset::Overview,
            None,
        );

        assert!(app.load_error().is_some());
        assert_eq!(app.table().len(), 0, "no partial scene after a failed load");
        assert!(app.hud_lines().iter().any(|line| line.contains("Press R to retry")));
        assert!(app.update(0.1).is_none());

        fs::write(&path, RECORD).expect("write record");
        assert!(app.handle(ViewerCommand::Restart));
        assert!(app.load_error().is_none());
        let controller = app.controller().expect("loaded");
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert!(app.hud_lines()[0].starts_with("Frame 1/4"));
    }

    #[test]
    fn stalled_redraws_are_capped() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("scene_data.json");
        fs::write(&path, RECORD).expect("write record");
        let mut app = ReplayApp::new(path, ReplayConfig::default(), CameraPreset::Overview, None);

        app.update(30.0);
        let clock = app.controller().expect("loaded").clock();
        assert_eq!(clock.current_time, MAX_FRAME_DELTA);
        app.update(f64::NAN);
        assert_eq!(app.controller().expect("loaded").clock().current_time, MAX_FRAME_DELTA);
    }

    #[test]
    fn commands_reach_the_controller_and_camera() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("scene_data.json");
        fs::write(&path, RECORD).expect("write record");
        let mut app = ReplayApp::new(path, ReplayConfig::default(), CameraPreset::Overview, None);

        app.handle(ViewerCommand::TogglePlay);
        assert_eq!(app.controller().map(|c| c.state()), Some(PlaybackState::Paused));

        app.handle(ViewerCommand::ToggleLanes);
        assert!(app.hud_lines()[1].starts_with("Lanes off | Road on"));

        app.handle(ViewerCommand::SeekBy(0.5));
        app.update(0.0);
        assert!(app.hud_lines()[0].starts_with("Frame 3/4"));

        app.handle(ViewerCommand::CycleCamera);
        assert_eq!(app.camera(), CameraPreset::Follow);
        app.handle(ViewerCommand::SetCamera(CameraPreset::Side));
        assert_eq!(app.camera(), CameraPreset::Side);
        assert!(!app.handle(ViewerCommand::Quit));
    }

    #[test]
    fn start_percent_positions_the_first_frame() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("scene_data.json");
        fs::write(&path, RECORD).expect("write record");
        let mut app = ReplayApp::new(
            path,
            ReplayConfig::default(),
            CameraPreset::Overview,
            Some(50.0),
        );

        assert_eq!(app.controller().expect("loaded").clock().current_time, 2.0);
        app.update(0.0);
        assert!(app.hud_lines()[0].starts_with("Frame 3/4"));
    }

    #[test]
    fn ground_and_road_are_installed_on_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("scene_data.json");
        fs::write(&path, RECORD).expect("write record");
        let app = ReplayApp::new(path, ReplayConfig::default(), CameraPreset::Follow, None);

        // ground plus the first real road surface
        assert_eq!(app.table().visible_surfaces().count(), 2);
        assert_eq!(app.table().box_instances().len(), 1);
        assert_eq!(app.table().line_vertices().len(), 2);
        assert!(app.view_projection(16.0 / 9.0).is_finite());
    }
}
