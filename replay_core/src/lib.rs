//! Playback and scene-reconstruction engine for precomputed perception
//! records.
//!
//! A record maps sparse frame identifiers to per-frame vehicle detections,
//! lane polylines and a drivable-area polygon. This crate turns that discrete
//! record into a continuous simulation: `playback` owns the simulated clock and
//! drives the vehicle pool and the throttled road/lane rebuild once per host
//! tick, issuing commands through the `scene_host::SceneHost` capability so the
//! whole pipeline runs without a renderer attached.

pub mod config;
pub mod coords;
pub mod frame_index;
pub mod playback;
pub mod record;
pub mod road;
pub mod scene_host;
pub mod triangulate;
pub mod vehicle_pool;

pub use config::{ConfigError, ReplayConfig};
pub use coords::{WorldMapper, WorldPoint};
pub use frame_index::FrameIndex;
pub use playback::{PlaybackClock, PlaybackController, PlaybackReadout, PlaybackState, TickReport};
pub use record::{FrameSample, LoadError, PerceptionRecord, RecordMetadata, VehicleDetection};
pub use road::{RebuildOutcome, RoadReconstructor, StageOutcome};
pub use scene_host::{
    RecordingSceneHost, RenderableHandle, SceneCommand, SceneError, SceneHost, SurfaceMesh,
    Transform,
};
pub use triangulate::GeometryError;
pub use vehicle_pool::VehiclePool;
