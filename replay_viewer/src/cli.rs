use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use replay_core::ReplayConfig;

use crate::camera::CameraPreset;

#[derive(Parser, Debug)]
#[command(
    about = "Replays a recorded perception stream as a reconstructed 3D scene",
    version
)]
pub struct Args {
    /// Perception record JSON written by the detection exporter
    #[arg(long, default_value = "artifacts/scene_data.json")]
    pub record: PathBuf,

    /// Optional replay config JSON; missing fields take their defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip creating a winit window/event loop; useful for headless automation
    #[arg(long)]
    pub headless: bool,

    /// Simulated seconds to play in headless mode (defaults to one full loop)
    #[arg(long)]
    pub duration: Option<f64>,

    /// Simulated ticks per second in headless mode
    #[arg(long, default_value_t = 30.0)]
    pub tick_hz: f64,

    /// When set, write the per-tick playback readout to this JSON file
    #[arg(long)]
    pub trace_json: Option<PathBuf>,

    /// Start playback at this point of the record, on a 0-100 scale
    #[arg(long)]
    pub start_percent: Option<f64>,

    /// Initial camera preset for the window
    #[arg(long, value_enum, default_value_t = CameraPreset::Overview)]
    pub camera: CameraPreset,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.tick_hz.is_finite() && self.tick_hz > 0.0,
            "tick_hz must be positive (got {})",
            self.tick_hz
        );
        if let Some(duration) = self.duration {
            ensure!(
                duration.is_finite() && duration >= 0.0,
                "duration must be a non-negative number of seconds (got {duration})"
            );
        }
        if let Some(percent) = self.start_percent {
            ensure!(
                (0.0..=100.0).contains(&percent),
                "start_percent must be between 0 and 100 (got {percent})"
            );
        }
        Ok(())
    }
}

pub fn load_replay_config(path: &Path) -> Result<ReplayConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading replay config {}", path.display()))?;
    let config: ReplayConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing replay config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating replay config {}", path.display()))?;
    Ok(config)
}

pub fn resolve_config(args: &Args) -> Result<ReplayConfig> {
    match &args.config {
        Some(path) => load_replay_config(path),
        None => Ok(ReplayConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(body.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let file = write_config(r#"{"rebuild_stride": 15, "autoplay": false}"#);
        let config = load_replay_config(file.path()).expect("config loads");
        assert_eq!(config.rebuild_stride, 15);
        assert!(!config.autoplay);
        assert_eq!(config.speed_max, ReplayConfig::default().speed_max);
    }

    #[test]
    fn invalid_config_reports_the_path() {
        let file = write_config(r#"{"rebuild_stride": 0}"#);
        let err = load_replay_config(file.path()).expect_err("stride 0 is rejected");
        let message = format!("{err:#}");
        assert!(message.contains("validating replay config"), "{message}");
        assert!(message.contains("rebuild_stride"), "{message}");
    }

    #[test]
    fn defaults_parse() {
        let args = Args::try_parse_from(["replay_viewer"]).expect("defaults parse");
        assert_eq!(args.record, PathBuf::from("artifacts/scene_data.json"));
        assert_eq!(args.camera, CameraPreset::Overview);
        assert!(!args.headless);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn headless_flags_parse() {
        let args = Args::try_parse_from([
            "replay_viewer",
            "--headless",
            "--duration",
            "2.5",
            "--tick-hz",
            "8",
            "--camera",
            "side",
            "--start-percent",
            "40",
        ])
        .expect("flags parse");
        assert!(args.headless);
        assert_eq!(args.duration, Some(2.5));
        assert_eq!(args.camera, CameraPreset::Side);
        assert_eq!(args.start_percent, Some(40.0));

        let past_end = Args::try_parse_from(["replay_viewer", "--start-percent", "120"])
            .expect("parses");
        assert!(past_end.validate().is_err());

        let bad = Args::try_parse_from(["replay_viewer", "--tick-hz", "0"]).expect("parses");
        assert!(bad.validate().is_err());
    }
}
