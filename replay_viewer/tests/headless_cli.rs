use std::{fs, path::PathBuf, process::Command};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

fn core_fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../replay_core/tests/fixtures")
        .join(name)
}

#[test]
fn headless_run_writes_a_trace() -> Result<()> {
    let dir = tempdir()?;
    let trace_path = dir.path().join("trace.json");

    let output = Command::new(env!("CARGO_BIN_EXE_replay_viewer"))
        .arg("--headless")
        .arg("--record")
        .arg(core_fixture("short_drive.json"))
        .arg("--tick-hz")
        .arg("8")
        .arg("--trace-json")
        .arg(&trace_path)
        .output()
        .context("running replay_viewer --headless")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "headless run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("6 of 6 frames visited"), "{stdout}");

    let data = fs::read_to_string(&trace_path).context("reading trace")?;
    let trace: Value = serde_json::from_str(&data).context("parsing trace")?;
    let entries = trace.as_array().context("trace is an array")?;
    // tick 0 plus one tick per frame of the 6-frame, 8 fps record
    assert_eq!(entries.len(), 7);
    assert_eq!(entries[0]["readout"]["frame_id"], 30);
    assert_eq!(entries[1]["readout"]["frame_id"], 31);
    assert_eq!(entries[6]["report"]["wrapped"], true);
    assert_eq!(entries[6]["readout"]["frame_position"], 1);
    Ok(())
}

#[test]
fn config_file_controls_autoplay() -> Result<()> {
    let dir = tempdir()?;
    let config_path = dir.path().join("replay.json");
    fs::write(&config_path, r#"{"autoplay": false}"#)?;
    let trace_path = dir.path().join("trace.json");

    let status = Command::new(env!("CARGO_BIN_EXE_replay_viewer"))
        .arg("--headless")
        .arg("--record")
        .arg(core_fixture("short_drive.json"))
        .arg("--config")
        .arg(&config_path)
        .arg("--duration")
        .arg("1")
        .arg("--trace-json")
        .arg(&trace_path)
        .status()
        .context("running replay_viewer --headless")?;
    assert!(status.success());

    let trace: Value = serde_json::from_str(&fs::read_to_string(&trace_path)?)?;
    let entries = trace.as_array().context("trace is an array")?;
    assert!(
        entries
            .iter()
            .all(|entry| entry["readout"]["state"] == "stopped" && entry["readout"]["frame_position"] == 1)
    );
    Ok(())
}

#[test]
fn unreadable_record_fails_without_panicking() -> Result<()> {
    let dir = tempdir()?;
    let output = Command::new(env!("CARGO_BIN_EXE_replay_viewer"))
        .arg("--headless")
        .arg("--record")
        .arg(dir.path().join("missing.json"))
        .output()
        .context("running replay_viewer --headless")?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loading perception record"), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");
    Ok(())
}

#[test]
fn missing_frames_is_reported() -> Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_replay_viewer"))
        .arg("--headless")
        .arg("--record")
        .arg(core_fixture("missing_frames.json"))
        .output()
        .context("running replay_viewer --headless")?;
    assert!(!output.status.success());
    Ok(())
}
