//! Window-less replay used for automation: drives the controller against the
//! in-memory scene host at a fixed tick rate and optionally writes a trace.

use std::{collections::BTreeSet, fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use replay_core::scene_host::RenderableKind;
use replay_core::{
    PerceptionRecord, PlaybackController, PlaybackReadout, RebuildOutcome, RecordingSceneHost,
    ReplayConfig, StageOutcome, TickReport,
};
use serde::Serialize;

use crate::cli::Args;

#[derive(Debug, Serialize)]
pub struct TraceEntry {
    pub tick: usize,
    pub readout: PlaybackReadout,
    pub report: TickReport,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct HeadlessSummary {
    pub ticks: usize,
    pub frames_visited: usize,
    pub loops: usize,
    pub rebuild_passes: usize,
    pub surface_failures: usize,
    pub lane_failures: usize,
    pub max_visible_vehicles: usize,
    pub vehicle_slots: usize,
    pub live_surfaces: usize,
    pub live_lanes: usize,
}

/// Tick `controller` `ticks` times by `dt` seconds, returning one trace entry
/// per tick. The entry for tick 0 is the activated, untouched state.
pub fn simulate(
    controller: &mut PlaybackController,
    host: &mut RecordingSceneHost,
    ticks: usize,
    dt: f64,
) -> Vec<TraceEntry> {
    controller.activate(host);
    let mut trace = Vec::with_capacity(ticks + 1);
    trace.push(TraceEntry {
        tick: 0,
        readout: controller.readout(),
        report: TickReport {
            advanced: false,
            wrapped: false,
            frame_changed: None,
            visible_vehicles: controller.vehicles().visible_count(),
            rebuild: RebuildOutcome::throttled(),
        },
    });
    for tick in 1..=ticks {
        let report = controller.tick(dt, host);
        trace.push(TraceEntry {
            tick,
            readout: controller.readout(),
            report,
        });
    }
    trace
}

pub fn summarize(
    trace: &[TraceEntry],
    controller: &PlaybackController,
    host: &RecordingSceneHost,
) -> HeadlessSummary {
    let frames: BTreeSet<usize> = trace
        .iter()
        .filter(|entry| entry.readout.frame_count > 0)
        .map(|entry| entry.readout.frame_position)
        .collect();
    let failed = |outcome: &StageOutcome| matches!(outcome, StageOutcome::Failed { .. });

    HeadlessSummary {
        ticks: trace.len().saturating_sub(1),
        frames_visited: frames.len(),
        loops: trace.iter().filter(|entry| entry.report.wrapped).count(),
        rebuild_passes: trace.iter().filter(|entry| entry.report.rebuild.ran).count(),
        surface_failures: trace
            .iter()
            .filter(|entry| failed(&entry.report.rebuild.surface))
            .count(),
        lane_failures: trace
            .iter()
            .filter(|entry| failed(&entry.report.rebuild.lanes))
            .count(),
        max_visible_vehicles: trace
            .iter()
            .map(|entry| entry.readout.visible_vehicles)
            .max()
            .unwrap_or(0),
        vehicle_slots: controller.vehicles().slot_count(),
        live_surfaces: host.live_count(RenderableKind::Surface),
        live_lanes: host.live_count(RenderableKind::Polyline),
    }
}

pub fn tick_count(duration: f64, tick_hz: f64) -> usize {
    if !(duration.is_finite() && tick_hz.is_finite()) || duration <= 0.0 || tick_hz <= 0.0 {
        return 0;
    }
    (duration * tick_hz).ceil() as usize
}

fn write_trace(path: &Path, trace: &[TraceEntry]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating trace file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), trace)
        .with_context(|| format!("writing trace to {}", path.display()))?;
    Ok(())
}

pub fn run(args: &Args, config: ReplayConfig) -> Result<HeadlessSummary> {
    let record = PerceptionRecord::from_path(&args.record)
        .with_context(|| format!("loading perception record {}", args.record.display()))?;
    let autoplay = config.autoplay;
    let mut controller = PlaybackController::new(record, config);
    let mut host = RecordingSceneHost::new();
    controller.activate(&mut host);
    if autoplay {
        controller.play();
    }
    if let Some(percent) = args.start_percent {
        controller.seek_percent(percent);
    }

    let duration = args
        .duration
        .unwrap_or_else(|| controller.clock().total_duration);
    let ticks = tick_count(duration, args.tick_hz);
    let trace = simulate(&mut controller, &mut host, ticks, 1.0 / args.tick_hz);
    let summary = summarize(&trace, &controller, &host);

    println!(
        "Replayed {} for {duration:.2}s at {} Hz: {} ticks, {} of {} frames visited, {} loop(s)",
        args.record.display(),
        args.tick_hz,
        summary.ticks,
        summary.frames_visited,
        controller.frame_index().len(),
        summary.loops
    );
    println!(
        "  rebuild passes: {} (surface failures {}, lane failures {})",
        summary.rebuild_passes, summary.surface_failures, summary.lane_failures
    );
    println!(
        "  vehicle slots: {} (peak visible {}), live surfaces: {}, live lanes: {}",
        summary.vehicle_slots,
        summary.max_visible_vehicles,
        summary.live_surfaces,
        summary.live_lanes
    );
    println!("  final: {}", controller.readout());

    if let Some(path) = &args.trace_json {
        write_trace(path, &trace)?;
        println!("Trace written to {}", path.display());
    }
    Ok(summary)
}
