//! Drivable-area surface and lane-line reconstruction.
//!
//! Geometry is rebuilt only on frames whose list index is a multiple of the
//! configured stride; every other frame keeps what was built last. The surface
//! and the lane set are separate stages, and a failure in one never touches
//! the other.

use glam::Vec3;
use serde::Serialize;

use crate::config::ReplayConfig;
use crate::coords::{WorldMapper, WorldPoint};
use crate::record::{FrameSample, PerceptionRecord, PixelPoint};
use crate::scene_host::{RenderableHandle, Rgb, SceneHost, SurfaceMesh};
use crate::triangulate::triangulate_outline;

pub const ROAD_COLOR: Rgb = [0.3, 0.31, 0.34];
pub const PLACEHOLDER_COLOR: Rgb = [0.2, 0.22, 0.2];
pub const LANE_COLOR: Rgb = [0.96, 0.93, 0.7];
const ROAD_ELEVATION: f32 = 0.0;

/// What one stage of a rebuild pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The frame was not on the rebuild stride.
    NotRun,
    /// Input too small to build anything; previous geometry kept.
    Skipped,
    Rebuilt { primitives: usize },
    /// Construction failed; previous geometry kept.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub ran: bool,
    pub surface: StageOutcome,
    pub lanes: StageOutcome,
}

impl RebuildOutcome {
    pub fn throttled() -> Self {
        Self {
            ran: false,
            surface: StageOutcome::NotRun,
            lanes: StageOutcome::NotRun,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InstalledSurface {
    handle: RenderableHandle,
    placeholder: bool,
}

#[derive(Debug, Default)]
struct RoadGeometryState {
    surface: Option<InstalledSurface>,
    lanes: Vec<RenderableHandle>,
}

#[derive(Debug)]
pub struct RoadReconstructor {
    stride: usize,
    mapper: WorldMapper,
    lane_elevation: f32,
    ground_extent: f32,
    road_visible: bool,
    lanes_visible: bool,
    state: RoadGeometryState,
}

impl RoadReconstructor {
    pub fn new(config: &ReplayConfig) -> Self {
        Self {
            stride: config.rebuild_stride.max(1),
            mapper: WorldMapper::from_config(config),
            lane_elevation: config.lane_elevation,
            ground_extent: config.ground_extent,
            road_visible: true,
            lanes_visible: true,
            state: RoadGeometryState::default(),
        }
    }

    /// Install the placeholder surface. Has no effect once any surface exists.
    pub fn attach<H>(&mut self, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        if self.state.surface.is_some() {
            return;
        }
        match host.create_surface(self.placeholder_mesh()) {
            Ok(handle) => {
                host.set_visible(handle, self.road_visible);
                self.state.surface = Some(InstalledSurface {
                    handle,
                    placeholder: true,
                });
            }
            Err(err) => log::warn!("placeholder surface unavailable: {err}"),
        }
    }

    fn placeholder_mesh(&self) -> SurfaceMesh {
        let half = self.ground_extent / 2.0;
        SurfaceMesh {
            vertices: vec![
                Vec3::new(-half, ROAD_ELEVATION, -half),
                Vec3::new(half, ROAD_ELEVATION, -half),
                Vec3::new(half, ROAD_ELEVATION, half),
                Vec3::new(-half, ROAD_ELEVATION, half),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            color: PLACEHOLDER_COLOR,
            double_sided: true,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_due(&self, frame_list_index: usize) -> bool {
        frame_list_index % self.stride == 0
    }

    /// Rebuild road and lanes from `sample` when `frame_list_index` is on the
    /// stride.
    pub fn maybe_rebuild<H>(
        &mut self,
        frame_list_index: usize,
        sample: &FrameSample,
        record: &PerceptionRecord,
        host: &mut H,
    ) -> RebuildOutcome
    where
        H: SceneHost + ?Sized,
    {
        if !self.is_due(frame_list_index) {
            return RebuildOutcome::throttled();
        }
        let surface = self.rebuild_surface(frame_list_index, sample, record, host);
        let lanes = self.rebuild_lanes(frame_list_index, sample, record, host);
        log::debug!(
            "rebuild at frame index {frame_list_index}: surface {surface:?}, lanes {lanes:?}"
        );
        RebuildOutcome {
            ran: true,
            surface,
            lanes,
        }
    }

    fn to_world(&self, record: &PerceptionRecord, point: PixelPoint) -> WorldPoint {
        let (nx, ny) = record.normalize_pixel(point);
        self.mapper.to_world(nx, ny)
    }

    fn rebuild_surface<H>(
        &mut self,
        frame_list_index: usize,
        sample: &FrameSample,
        record: &PerceptionRecord,
        host: &mut H,
    ) -> StageOutcome
    where
        H: SceneHost + ?Sized,
    {
        if sample.drivable_area.len() < 3 {
            return StageOutcome::Skipped;
        }
        let outline: Vec<WorldPoint> = sample
            .drivable_area
            .iter()
            .map(|&point| self.to_world(record, point))
            .collect();

        let built = triangulate_outline(&outline, ROAD_ELEVATION, ROAD_COLOR)
            .map_err(|err| err.to_string())
            .and_then(|mesh| {
                let triangles = mesh.triangle_count();
                host.create_surface(mesh)
                    .map(|handle| (handle, triangles))
                    .map_err(|err| err.to_string())
            });
        let (handle, triangles) = match built {
            Ok(built) => built,
            Err(reason) => {
                log::warn!(
                    "keeping previous road surface, rebuild at frame index {frame_list_index} failed: {reason}"
                );
                return StageOutcome::Failed { reason };
            }
        };

        host.set_visible(handle, self.road_visible);
        let previous = self.state.surface.replace(InstalledSurface {
            handle,
            placeholder: false,
        });
        if let Some(previous) = previous {
            if previous.placeholder {
                log::debug!("first road surface installed, removing placeholder");
            }
            host.destroy(previous.handle);
        }
        StageOutcome::Rebuilt {
            primitives: triangles,
        }
    }

    fn rebuild_lanes<H>(
        &mut self,
        frame_list_index: usize,
        sample: &FrameSample,
        record: &PerceptionRecord,
        host: &mut H,
    ) -> StageOutcome
    where
        H: SceneHost + ?Sized,
    {
        let mut built = Vec::with_capacity(sample.lane_lines.len());
        for (line_index, line) in sample.lane_lines.iter().enumerate() {
            if line.len() < 2 {
                continue;
            }
            let points: Vec<Vec3> = line
                .iter()
                .map(|&point| self.to_world(record, point).at_elevation(self.lane_elevation))
                .collect();
            match host.create_polyline(&points, LANE_COLOR) {
                Ok(handle) => {
                    host.set_visible(handle, self.lanes_visible);
                    built.push(handle);
                }
                Err(err) => {
                    for handle in built {
                        host.destroy(handle);
                    }
                    let reason = format!("lane {line_index}: {err}");
                    log::warn!(
                        "keeping previous lane lines, rebuild at frame index {frame_list_index} failed: {reason}"
                    );
                    return StageOutcome::Failed { reason };
                }
            }
        }

        for handle in self.state.lanes.drain(..) {
            host.destroy(handle);
        }
        let primitives = built.len();
        self.state.lanes = built;
        StageOutcome::Rebuilt { primitives }
    }

    pub fn road_visible(&self) -> bool {
        self.road_visible
    }

    pub fn lanes_visible(&self) -> bool {
        self.lanes_visible
    }

    pub fn set_road_visible<H>(&mut self, visible: bool, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        self.road_visible = visible;
        if let Some(surface) = self.state.surface {
            host.set_visible(surface.handle, visible);
        }
    }

    pub fn set_lanes_visible<H>(&mut self, visible: bool, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        self.lanes_visible = visible;
        for &handle in &self.state.lanes {
            host.set_visible(handle, visible);
        }
    }

    pub fn surface_handle(&self) -> Option<RenderableHandle> {
        self.state.surface.map(|surface| surface.handle)
    }

    pub fn has_placeholder(&self) -> bool {
        self.state.surface.is_some_and(|surface| surface.placeholder)
    }

    pub fn lane_handles(&self) -> &[RenderableHandle] {
        &self.state.lanes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_host::{RecordingSceneHost, RenderableKind};

    fn record() -> PerceptionRecord {
        PerceptionRecord::from_json_str(
            r#"{"frames": {}, "metadata": {"fps": 30, "image_width": 1280, "image_height": 720}}"#,
        )
        .expect("record parses")
    }

    fn road_sample() -> FrameSample {
        FrameSample {
            drivable_area: vec![[0.0, 720.0], [400.0, 300.0], [880.0, 300.0], [1280.0, 720.0]],
            lane_lines: vec![
                vec![[200.0, 720.0], [560.0, 320.0]],
                vec![[1080.0, 720.0], [720.0, 320.0]],
            ],
            ..FrameSample::default()
        }
    }

    fn attached(config: &ReplayConfig, host: &mut RecordingSceneHost) -> RoadReconstructor {
        let mut road = RoadReconstructor::new(config);
        road.attach(host);
        road
    }

    #[test]
    fn rebuild_fires_only_on_stride() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        let sample = road_sample();

        let fired: Vec<usize> = (0..120)
            .filter(|&index| road.maybe_rebuild(index, &sample, &record, &mut host).ran)
            .collect();
        assert_eq!(fired, vec![0, 60]);
        // placeholder plus one surface per pass
        assert_eq!(host.created_count(RenderableKind::Surface), 3);
    }

    #[test]
    fn first_real_surface_replaces_placeholder() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        let placeholder = road.surface_handle().expect("placeholder installed");
        assert!(road.has_placeholder());

        let outcome = road.maybe_rebuild(0, &road_sample(), &record, &mut host);
        assert_eq!(outcome.surface, StageOutcome::Rebuilt { primitives: 2 });
        assert!(!road.has_placeholder());
        assert!(!host.is_live(placeholder));
        assert_eq!(host.live_count(RenderableKind::Surface), 1);

        road.attach(&mut host);
        assert_eq!(host.created_count(RenderableKind::Surface), 2);
    }

    #[test]
    fn two_point_polygon_keeps_previous_surface() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        road.maybe_rebuild(0, &road_sample(), &record, &mut host);
        let installed = road.surface_handle().expect("surface installed");

        let thin = FrameSample {
            drivable_area: vec![[0.0, 0.0], [10.0, 10.0]],
            ..FrameSample::default()
        };
        let outcome = road.maybe_rebuild(60, &thin, &record, &mut host);
        assert!(outcome.ran);
        assert_eq!(outcome.surface, StageOutcome::Skipped);
        assert_eq!(road.surface_handle(), Some(installed));
        assert!(host.is_live(installed));
    }

    #[test]
    fn failed_surface_keeps_placeholder_and_lanes_still_build() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        let collapsed = FrameSample {
            drivable_area: vec![[100.0, 100.0]; 4],
            ..road_sample()
        };

        let outcome = road.maybe_rebuild(0, &collapsed, &record, &mut host);
        assert!(matches!(outcome.surface, StageOutcome::Failed { .. }));
        assert_eq!(outcome.lanes, StageOutcome::Rebuilt { primitives: 2 });
        assert!(road.has_placeholder());
    }

    #[test]
    fn lane_failure_keeps_previous_lane_set() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        road.maybe_rebuild(0, &road_sample(), &record, &mut host);
        let previous = road.lane_handles().to_vec();
        assert_eq!(previous.len(), 2);

        // the first new polyline is accepted, the second carries a NaN point
        let mut broken = road_sample();
        broken.lane_lines[1][0] = [f64::NAN, 720.0];
        let outcome = road.maybe_rebuild(60, &broken, &record, &mut host);

        assert!(matches!(outcome.lanes, StageOutcome::Failed { .. }));
        assert_eq!(outcome.surface, StageOutcome::Rebuilt { primitives: 2 });
        assert_eq!(road.lane_handles(), previous.as_slice());
        assert!(previous.iter().all(|&handle| host.is_live(handle)));
        assert_eq!(host.live_count(RenderableKind::Polyline), 2);
        assert_eq!(host.created_count(RenderableKind::Polyline), 3);
    }

    #[test]
    fn short_polylines_are_skipped() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        let sample = FrameSample {
            lane_lines: vec![vec![[10.0, 10.0]], vec![], vec![[0.0, 0.0], [5.0, 5.0]]],
            ..FrameSample::default()
        };
        let outcome = road.maybe_rebuild(0, &sample, &record, &mut host);
        assert_eq!(outcome.surface, StageOutcome::Skipped);
        assert_eq!(outcome.lanes, StageOutcome::Rebuilt { primitives: 1 });
    }

    #[test]
    fn lanes_sit_above_the_road() {
        let config = ReplayConfig::default();
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&config, &mut host);
        road.maybe_rebuild(0, &road_sample(), &record, &mut host);

        let lane = road.lane_handles()[0];
        let recorded = host.get(lane).expect("lane live");
        assert_eq!(recorded.kind, RenderableKind::Polyline);
        assert_eq!(recorded.color, LANE_COLOR);
        assert!(config.lane_elevation > ROAD_ELEVATION);
    }

    #[test]
    fn visibility_flags_apply_to_new_geometry() {
        let record = record();
        let mut host = RecordingSceneHost::new();
        let mut road = attached(&ReplayConfig::default(), &mut host);
        road.set_lanes_visible(false, &mut host);
        road.set_road_visible(false, &mut host);
        let placeholder = road.surface_handle().expect("placeholder");
        assert!(!host.get(placeholder).expect("live").visible);

        road.maybe_rebuild(0, &road_sample(), &record, &mut host);
        assert_eq!(host.visible_count(RenderableKind::Polyline), 0);
        assert_eq!(host.visible_count(RenderableKind::Surface), 0);

        road.set_lanes_visible(true, &mut host);
        assert_eq!(host.visible_count(RenderableKind::Polyline), 2);
    }
}
