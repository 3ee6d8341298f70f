//! `rover-cli` – Rover Command Line Interface
//!
//! Runs the demo brain on a simulated rover until Ctrl-C:
//!
//! 1. Loads `~/.rover/config.toml`, writing the defaults on first run, then
//!    applies `ROVER_*` environment overrides.
//! 2. Brings the rover up (all lights on, one blink).
//! 3. Starts the deliberative and reactive loops.
//! 4. On **Ctrl-C**, runs the shutdown protocol and prints the report.

mod config;
mod demo;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;
use rover_hal::SimRover;
use rover_runtime::{LoopKind, Scheduler, ShutdownReport};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    // Hold the guard until exit so pending spans are flushed.
    let _telemetry = rover_runtime::init_tracing("rover");
    rover_runtime::install_panic_hook();

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the rover …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the rover can only be stopped by killing the process");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let mut cfg = load_config();
    config::apply_env_overrides(&mut cfg);
    println!(
        "  shutdown timeout {}s · reactive pacing {} · obstacle threshold {} cm",
        cfg.effective_shutdown_timeout_secs(),
        cfg.reactive_pacing_ms
            .map_or_else(|| "off".to_string(), |ms| format!("{ms}ms")),
        cfg.obstacle_cm
    );

    // ── Bring-up ──────────────────────────────────────────────────────────
    let rover = Arc::new(SimRover::new());
    rover.all_lights_on();
    rover.blink_all_lights();
    info!(lights_on = rover.lights_on(), "rover body ready");

    let brain = Arc::new(demo::brain(cfg.obstacle_cm));
    let handle = match Scheduler::new(cfg.scheduler_config()).start(brain, Arc::clone(&rover)) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the rover".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  {} run {} – press {} to stop.\n",
        "✓".green().bold(),
        handle.run_id().to_string().dimmed(),
        "Ctrl-C".bold()
    );

    // ── Run until Ctrl-C ──────────────────────────────────────────────────
    let mut last_status = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
        if last_status.elapsed() >= STATUS_INTERVAL {
            last_status = Instant::now();
            for kind in handle.stalled_loops() {
                println!("  {} {} loop looks stalled", "!".yellow().bold(), kind);
            }
            let (left, right) = rover.wheel_speeds();
            info!(
                deliberative_iterations = handle.iterations(LoopKind::Deliberative),
                reactive_iterations = handle.iterations(LoopKind::Reactive),
                distance_cm = rover.distance_cm(),
                left,
                right,
                "status"
            );
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────
    let report = handle.stop();
    print_report(&report);
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Read the config file, writing the defaults on first run. Any error falls
/// back to the defaults so the rover can still be driven.
fn load_config() -> config::Config {
    let path = config::config_path();
    match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                      "#.bold().cyan());
    println!("{}", r#"  / _ \___ _  _____ ____    "#.bold().cyan());
    println!("{}", r#" / , _/ _ \ |/ / -_) __/    "#.bold().cyan());
    println!("{}", r#"/_/|_|\___/___/\__/_/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Deliberative + reactive behavior scheduler");
    println!();
}

fn print_report(report: &ShutdownReport) {
    println!();
    if report.is_clean() {
        println!(
            "  {} Both loops stopped in {} ms; rover released.",
            "✓".green().bold(),
            report.elapsed_ms
        );
    } else {
        for kind in &report.timed_out {
            println!(
                "  {} {} loop did not stop in time",
                "✗".red().bold(),
                kind
            );
        }
        if !report.body_released {
            println!("  {} rover release failed", "✗".red().bold());
        }
    }
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json.dimmed()),
        Err(e) => warn!(error = %e, "failed to serialize shutdown report"),
    }
}
