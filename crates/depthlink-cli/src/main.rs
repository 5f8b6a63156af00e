//! `depthlink-cli` – DepthLink command line interface.
//!
//! This binary:
//!
//! 1. Loads `~/.depthlink/config.toml` (defaults when absent) and applies
//!    `DEPTHLINK_*` environment overrides.
//! 2. Starts the streaming pipeline on a Tokio runtime, fed by a simulated
//!    corridor walk, sending telemetry over UDP to the configured host.
//! 3. Drops the user into an interactive REPL (`/start`, `/stop`, `/host`,
//!    `/status`, `/help`).
//! 4. Intercepts **Ctrl-C** to end the frame source and exit cleanly.

mod config;
mod repl;
mod sim;

use colored::Colorize;
use depthlink_middleware::{TransportSession, control_channel};
use depthlink_runtime::{SessionController, StreamingPipeline, init_tracing};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use sim::{SimulatedWalk, WalkConfig};

fn main() {
    let _tracing = init_tracing("depthlink");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the stream …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            match config::save(&config::Config::default()) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::Config::fallback()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using defaults with DEPTHLINK_* overrides.");
            config::Config::fallback()
        }
    };

    // ── Pipeline ──────────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return;
        }
    };

    let (commands, inbox) = control_channel();
    let source = SimulatedWalk::new(
        WalkConfig {
            frame_rate_hz: cfg.frame_rate_hz,
            ..WalkConfig::default()
        },
        shutdown.clone(),
    );
    let controller = SessionController::new(
        cfg.endpoint(),
        TransportSession::new(commands.clone()),
        source.tracking_control(),
    )
    .with_obstacle_config(cfg.obstacle.clone())
    .with_survey_config(cfg.survey.clone());
    let status = controller.watch_status();
    let pipeline = runtime.spawn(StreamingPipeline::new(source, controller, inbox).run());

    println!(
        "  Receiver   : {}   (simulated tracker at {} Hz)",
        cfg.endpoint().to_string().bold(),
        cfg.frame_rate_hz
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(shutdown.clone(), commands, status, cfg);

    shutdown.store(true, Ordering::SeqCst);
    match runtime.block_on(pipeline) {
        Ok((_, stats)) => println!(
            "  {} {} frames, {} streamed, {} survey points.",
            "✓".green().bold(),
            stats.frames,
            stats.streamed_frames,
            stats.surveys
        ),
        Err(e) => error!(error = %e, "streaming pipeline task failed"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ___           _   _     _    _       _    "#.bold().cyan());
    println!("{}", r#"   |   \ ___ _ __| |_| |_  | |  (_)_ _  | |__ "#.bold().cyan());
    println!("{}", r#"   | |) / -_) '_ \  _| ' \ | |__| | ' \ | / / "#.bold().cyan());
    println!("{}", r#"   |___/\___| .__/\__|_||_||____|_|_||_||_\_\ "#.bold().cyan());
    println!("{}", r#"            |_|                               "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "DepthLink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Pose, obstacle and survey telemetry over UDP");
    println!();
}
