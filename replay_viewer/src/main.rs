mod app;
mod camera;
mod cli;
mod headless;
mod input;
mod renderer;
mod scene_table;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use pollster::FutureExt;
use wgpu::SurfaceError;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

use app::ReplayApp;
use cli::Args;
use input::command_for_key;
use renderer::Renderer;

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::init();

    args.validate()?;
    let config = cli::resolve_config(&args)?;

    if args.headless {
        headless::run(&args, config)?;
        return Ok(());
    }

    run_window(&args, config)
}

fn run_window(args: &Args, config: replay_core::ReplayConfig) -> Result<()> {
    let mut app = ReplayApp::new(
        args.record.clone(),
        config,
        args.camera,
        args.start_percent,
    );

    let event_loop = EventLoop::new().context("creating winit event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(format!("Replay Viewer - {}", args.record.display()))
            .with_inner_size(PhysicalSize::new(1280, 720))
            .build(&event_loop)
            .context("creating viewer window")?,
    );

    let mut renderer = Renderer::new(window).block_on()?;
    let mut last_frame = Instant::now();

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { window_id, event } if window_id == renderer.window().id() => {
                    match event {
                        WindowEvent::CloseRequested => target.exit(),
                        WindowEvent::KeyboardInput {
                            event:
                                KeyEvent {
                                    logical_key,
                                    state: ElementState::Pressed,
                                    ..
                                },
                            ..
                        } => {
                            if let Some(command) = command_for_key(&logical_key) {
                                if !app.handle(command) {
                                    target.exit();
                                }
                            }
                        }
                        WindowEvent::Resized(new_size) => renderer.resize(new_size),
                        WindowEvent::RedrawRequested => {
                            let now = Instant::now();
                            app.update(now.duration_since(last_frame).as_secs_f64());
                            last_frame = now;

                            let view_projection = app.view_projection(renderer.aspect());
                            let hud = app.hud_lines();
                            match renderer.render(app.table(), view_projection, &hud) {
                                Ok(_) => {}
                                Err(SurfaceError::Lost) => renderer.resize(renderer.size()),
                                Err(SurfaceError::OutOfMemory) => target.exit(),
                                Err(err) => log::warn!("render error: {err:?}"),
                            }
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => renderer.window().request_redraw(),
                _ => {}
            }
        })
        .context("running replay viewer")?;
    Ok(())
}
