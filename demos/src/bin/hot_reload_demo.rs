//! # Hot Reload Demo
//!
//! Runs two plugins against the in-memory backend and a headless surface,
//! reloading one of them partway through. Prints the leak report of every
//! reload and the engine metrics at exit.
//!
//! ```text
//! cargo run -p gpu-plugin-demos --bin hot_reload_demo -- --frames 120 --reload-at 60
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use gpu_plugin_demos::plugins::{BackgroundPlugin, DemoPlugin, OverlayPlugin};
use plugin_gpu_host::{
    DrainPolicy, DummyBackend, Engine, EngineConfig, GraphicsResult, HeadlessSurface,
    LoggingConfig, ManualFrameScheduler, TextureFormat, init_logging,
};

/// Plugin GPU host hot-reload demo.
#[derive(Parser, Debug)]
#[command(name = "hot_reload_demo", version)]
struct Args {
    /// Number of frames to run.
    #[arg(long, default_value = "120")]
    frames: u64,

    /// Frame at which the background plugin is reloaded.
    #[arg(long, default_value = "60")]
    reload_at: u64,

    /// Surface width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Surface height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Keep objects another plugin still references alive on teardown.
    #[arg(long)]
    respect_foreign: bool,

    /// Log filter, e.g. "plugin_gpu_host=debug".
    #[arg(long)]
    log: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut logging = LoggingConfig::default();
    if let Some(filter) = &args.log {
        logging = logging.with_filter(filter.clone());
    }
    init_logging(logging);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> GraphicsResult<()> {
    let drain_policy = if args.respect_foreign {
        DrainPolicy::RespectForeignReferences
    } else {
        DrainPolicy::Force
    };
    let format = TextureFormat::Bgra8Unorm;

    let scheduler = ManualFrameScheduler::new();
    let mut engine = Engine::new(
        Arc::new(DummyBackend::new()),
        Box::new(scheduler.clone()),
        EngineConfig::default()
            .with_label("demo")
            .with_drain_policy(drain_policy),
    );
    engine.add_surface(Box::new(HeadlessSurface::new(
        "main",
        args.width,
        args.height,
        format,
    )?))?;

    let mut background = BackgroundPlugin::new([0.1, 0.2, 0.4, 1.0]);
    let mut overlay = OverlayPlugin::new(4);
    let plugins: [&mut dyn DemoPlugin; 2] = [&mut background, &mut overlay];
    for plugin in plugins {
        engine.register_plugin(plugin.id())?;
        plugin.load(&mut engine, format)?;
    }

    engine.start()?;
    let frame_interval = Duration::from_micros(16_667);
    let mut now = Duration::ZERO;
    let mut frame = 0;
    while frame < args.frames && scheduler.take_pending().is_some() {
        if frame == args.reload_at {
            let report = engine.invalidate_plugin(background.id())?;
            if report.has_leaks {
                for leak in &report.leaks {
                    log::warn!("leak after reload: {leak}");
                }
            } else {
                log::info!("background reloaded cleanly");
            }
            background.set_tint([0.4, 0.1, 0.1, 1.0]);
            background.load(&mut engine, format)?;
        }

        now += frame_interval;
        engine.frame(now, |engine, _time| {
            engine.encode("frame", |ctx| ctx.execute_all_graphs().map(|_| ()))
        })?;
        frame += 1;
    }

    let metrics = engine.metrics();
    log::info!(
        "ran {} frame(s): {} draw call(s), {} command buffer(s), {} pipeline(s), shader cache {}/{} hit/miss",
        metrics.frame_count,
        metrics.total_draw_calls,
        metrics.command_buffers_submitted,
        metrics.pipelines,
        metrics.shader_cache.hits,
        metrics.shader_cache.misses
    );

    for plugin in [overlay.id().clone(), background.id().clone()] {
        let report = engine.unregister_plugin(&plugin)?;
        log::info!("unregistered '{plugin}': {} leak(s)", report.total_leak_count);
    }
    engine.dispose();
    Ok(())
}
