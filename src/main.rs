#![cfg(not(target_arch = "wasm32"))]

use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic;

use anyhow::Context;
use log::{error, info, LevelFilter};

use strafe_engine::config::SchedulerConfig;
use strafe_engine::demo::{demo_assets, HeadlessAudio, HeadlessRenderer, ScriptedInput};
use strafe_engine::{Scene, SceneConfig};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_FRAMES: u64 = 600;

fn main() -> anyhow::Result<()> {
    setup_diagnostics();
    setup_cpu_math();

    let frames = frame_count()?;
    info!("Starting strafe_engine headless demo for {frames} frames...");

    let config = SceneConfig {
        scheduler: SchedulerConfig {
            high_priority: cfg!(feature = "high_priority"),
            ..SchedulerConfig::default()
        },
        ..SceneConfig::default()
    };
    let mut scene = Scene::load(config, demo_assets()).context("failed to load the demo scene")?;

    let mut renderer = HeadlessRenderer::new();
    let mut audio = HeadlessAudio::new();
    for frame in 0..frames {
        let input = ScriptedInput::benchmark(frame);
        if let Err(e) = scene.run_frame(&input, &mut renderer, &mut audio) {
            error!("frame {frame} failed: {e}");
            return Err(e).with_context(|| format!("physics failed on frame {frame}"));
        }
    }

    for boss in scene.bosses() {
        info!(
            "{}: health {:.2} / {:.2}{}",
            boss.name(),
            boss.health(),
            boss.max_health(),
            if boss.model().is_removed() { " (defeated)" } else { "" }
        );
    }
    info!(
        "{} frames presented, {} meshes drawn",
        renderer.presents(),
        renderer.total_draws()
    );

    scene.shutdown().context("physics thread did not stop cleanly")?;
    Ok(())
}

/// Frame count from the first argument.
fn frame_count() -> anyhow::Result<u64> {
    match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("frame count must be a positive integer, got '{arg}'")),
        None => Ok(DEFAULT_FRAMES),
    }
}

/// Flush-to-zero and denormals-are-zero on the main thread.
fn setup_cpu_math() {
    #[cfg(target_arch = "x86_64")]
    {
        unsafe {
            let mut mxcsr: u32 = 0;
            std::arch::asm!("stmxcsr [{}]", in(reg) &mut mxcsr);
            mxcsr |= (1 << 15) | (1 << 6); // FZ | DAZ
            std::arch::asm!("ldmxcsr [{}]", in(reg) &mxcsr);
        }
        info!("Enabled FTZ/DAZ on the main thread.");
    }
}

/// Logger plus a panic hook that leaves a crash report behind.
fn setup_diagnostics() {
    env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .init();

    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();

        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };

        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));

        let thread = std::thread::current();
        let crash_msg = format!(
            "=== ENGINE CRASH ===\nThread: {}\nReason: {}\nLocation: {}\n\nStack Trace:\n{}",
            thread.name().unwrap_or("<unnamed>"),
            msg,
            location,
            backtrace
        );

        eprintln!("\x1b[31;1m{}\x1b[0m", crash_msg);

        if let Ok(mut file) = File::create("engine_crash.log") {
            let _ = file.write_all(crash_msg.as_bytes());
            eprintln!("Crash report saved to engine_crash.log");
        }
    }));
}
