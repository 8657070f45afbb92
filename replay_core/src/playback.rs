//! Simulated clock and the per-tick driver for the scene.
//!
//! The controller is the only mutator of the clock, the vehicle pool and the
//! road geometry. Hosts call `tick` once per display refresh with the real
//! elapsed time; everything downstream of the clock happens only when the
//! resolved discrete frame changes.

use std::fmt;

use serde::Serialize;

use crate::config::ReplayConfig;
use crate::frame_index::FrameIndex;
use crate::record::PerceptionRecord;
use crate::road::{RebuildOutcome, RoadReconstructor};
use crate::scene_host::SceneHost;
use crate::vehicle_pool::VehiclePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackClock {
    pub current_time: f64,
    pub speed_multiplier: f64,
    pub state: PlaybackState,
    pub total_duration: f64,
    pub current_frame_index: usize,
}

impl PlaybackClock {
    fn new(total_duration: f64, speed_multiplier: f64) -> Self {
        Self {
            current_time: 0.0,
            speed_multiplier,
            state: PlaybackState::Stopped,
            total_duration,
            current_frame_index: 0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Position in [0, 1]; zero for a record without duration.
    pub fn progress(&self) -> f64 {
        if self.total_duration > 0.0 {
            (self.current_time / self.total_duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// What a single `tick` did downstream of the clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub advanced: bool,
    pub wrapped: bool,
    /// Set when the tick moved the scene to a different frame.
    pub frame_changed: Option<usize>,
    pub visible_vehicles: usize,
    pub rebuild: RebuildOutcome,
}

impl TickReport {
    fn idle(visible_vehicles: usize) -> Self {
        Self {
            advanced: false,
            wrapped: false,
            frame_changed: None,
            visible_vehicles,
            rebuild: RebuildOutcome::throttled(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackReadout {
    /// 1-based position in the frame list, 0 when there are no frames.
    pub frame_position: usize,
    pub frame_count: usize,
    pub frame_id: Option<i64>,
    pub timestamp: Option<f64>,
    pub elapsed: f64,
    pub total: f64,
    pub visible_vehicles: usize,
    pub speed: f64,
    pub state: PlaybackState,
    pub lanes_visible: bool,
    pub road_visible: bool,
}

impl PlaybackReadout {
    pub fn frame_label(&self) -> String {
        format!("{}/{}", self.frame_position, self.frame_count)
    }

    pub fn time_label(&self) -> String {
        format!("{} / {}", format_clock(self.elapsed), format_clock(self.total))
    }
}

impl fmt::Display for PlaybackReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame {} | {} | Vehicles {} | {:.1}x | {}",
            self.frame_label(),
            self.time_label(),
            self.visible_vehicles,
            self.speed,
            self.state.label()
        )
    }
}

/// `mm:ss`, truncating fractional seconds. Minutes are not wrapped at 60.
pub fn format_clock(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

pub struct PlaybackController {
    record: PerceptionRecord,
    index: FrameIndex,
    config: ReplayConfig,
    clock: PlaybackClock,
    pool: VehiclePool,
    road: RoadReconstructor,
    activated: bool,
}

impl PlaybackController {
    pub fn new(record: PerceptionRecord, config: ReplayConfig) -> Self {
        let index = FrameIndex::build(&record);
        if let Err(err) = config.validate() {
            log::warn!("replay config is invalid: {err}");
        }
        let clock = PlaybackClock::new(record.total_duration(), config.clamp_speed(1.0));
        if index.is_empty() {
            log::warn!("perception record has no usable frames; playback is inert");
        }
        Self {
            pool: VehiclePool::new(&config),
            road: RoadReconstructor::new(&config),
            record,
            index,
            config,
            clock,
            activated: false,
        }
    }

    /// Install the placeholder road and show frame 0. Called once the record
    /// is fully loaded; `tick` calls it on first use if the host has not.
    pub fn activate<H>(&mut self, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        if self.activated {
            return;
        }
        self.activated = true;
        self.road.attach(host);
        if !self.index.is_empty() {
            self.apply_frame(0, host);
        }
    }

    pub fn play(&mut self) {
        if self.index.is_empty() {
            log::debug!("play ignored: no frames");
            return;
        }
        self.clock.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        if self.clock.state == PlaybackState::Playing {
            self.clock.state = PlaybackState::Paused;
        }
    }

    pub fn toggle_play(&mut self) {
        if self.clock.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Back to time zero, playing, with frame 0 applied immediately.
    pub fn restart<H>(&mut self, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        self.activate(host);
        self.clock.current_time = 0.0;
        self.clock.current_frame_index = 0;
        if self.index.is_empty() {
            return;
        }
        self.clock.state = PlaybackState::Playing;
        self.apply_frame(0, host);
    }

    /// Jump to `progress * total_duration`. The scene follows on the next
    /// tick, whatever the play state.
    pub fn seek(&mut self, progress: f64) {
        if !progress.is_finite() {
            log::warn!("ignoring seek to non-finite progress {progress}");
            return;
        }
        self.clock.current_time = progress.clamp(0.0, 1.0) * self.clock.total_duration;
    }

    pub fn seek_percent(&mut self, percent: f64) {
        self.seek(percent / 100.0);
    }

    /// Move the playhead by a fraction of the total duration.
    pub fn seek_by(&mut self, delta_progress: f64) {
        self.seek(self.clock.progress() + delta_progress);
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        if !multiplier.is_finite() {
            log::warn!("ignoring non-finite speed {multiplier}");
            return;
        }
        self.clock.speed_multiplier = self.config.clamp_speed(multiplier);
    }

    pub fn adjust_speed(&mut self, delta: f64) {
        self.set_speed(self.clock.speed_multiplier + delta);
    }

    pub fn tick<H>(&mut self, real_delta: f64, host: &mut H) -> TickReport
    where
        H: SceneHost + ?Sized,
    {
        self.activate(host);
        if self.index.is_empty() {
            return TickReport::idle(0);
        }

        let delta = if real_delta.is_finite() && real_delta > 0.0 {
            real_delta
        } else {
            0.0
        };
        let mut advanced = false;
        let mut wrapped = false;
        if self.clock.is_playing() && delta > 0.0 {
            self.clock.current_time += delta * self.clock.speed_multiplier;
            advanced = true;
            if self.clock.current_time >= self.clock.total_duration {
                self.clock.current_time = 0.0;
                wrapped = true;
            }
        }

        let target = self
            .index
            .resolve(self.clock.current_time)
            .unwrap_or_default();
        if target == self.clock.current_frame_index {
            return TickReport {
                advanced,
                wrapped,
                ..TickReport::idle(self.pool.visible_count())
            };
        }

        let (visible_vehicles, rebuild) = self.apply_frame(target, host);
        TickReport {
            advanced,
            wrapped,
            frame_changed: Some(target),
            visible_vehicles,
            rebuild,
        }
    }

    fn apply_frame<H>(&mut self, frame_list_index: usize, host: &mut H) -> (usize, RebuildOutcome)
    where
        H: SceneHost + ?Sized,
    {
        self.clock.current_frame_index = frame_list_index;
        let Some((frame_id, sample)) = self.index.sample_at(&self.record, frame_list_index) else {
            log::warn!("frame list index {frame_list_index} has no sample");
            return (self.pool.visible_count(), RebuildOutcome::throttled());
        };
        log::trace!("applying frame {frame_id} (list index {frame_list_index})");
        let visible = self.pool.reconcile(&sample.vehicles, host);
        let rebuild = self
            .road
            .maybe_rebuild(frame_list_index, sample, &self.record, host);
        (visible, rebuild)
    }

    pub fn set_lanes_visible<H>(&mut self, visible: bool, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        self.road.set_lanes_visible(visible, host);
    }

    pub fn set_road_visible<H>(&mut self, visible: bool, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        self.road.set_road_visible(visible, host);
    }

    pub fn toggle_lanes<H>(&mut self, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        let visible = !self.road.lanes_visible();
        self.set_lanes_visible(visible, host);
    }

    pub fn toggle_road<H>(&mut self, host: &mut H)
    where
        H: SceneHost + ?Sized,
    {
        let visible = !self.road.road_visible();
        self.set_road_visible(visible, host);
    }

    pub fn readout(&self) -> PlaybackReadout {
        let frame_count = self.index.len();
        let current = self
            .index
            .sample_at(&self.record, self.clock.current_frame_index);
        PlaybackReadout {
            frame_position: if frame_count == 0 {
                0
            } else {
                self.clock.current_frame_index + 1
            },
            frame_count,
            frame_id: current.map(|(id, _)| id),
            timestamp: current.map(|(id, sample)| self.record.timestamp_of(id, sample)),
            elapsed: self.clock.current_time,
            total: self.clock.total_duration,
            visible_vehicles: self.pool.visible_count(),
            speed: self.clock.speed_multiplier,
            state: self.clock.state,
            lanes_visible: self.road.lanes_visible(),
            road_visible: self.road.road_visible(),
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state
    }

    pub fn record(&self) -> &PerceptionRecord {
        &self.record
    }

    pub fn frame_index(&self) -> &FrameIndex {
        &self.index
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn vehicles(&self) -> &VehiclePool {
        &self.pool
    }

    pub fn road(&self) -> &RoadReconstructor {
        &self.road
    }
}
