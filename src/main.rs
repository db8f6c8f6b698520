// src/main.rs - Laser host: spools a demo job onto a simulated laser
use clap::Parser;
use krusty_laser::config::{self, Config};
use krusty_laser::context::{Context, DeviceEvent, HostContext};
use krusty_laser::{Command, Interpreter, Job, RealtimeCommand, RealtimeOutcome, SimulatedLaser, Spooler, driver};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Parser)]
#[command(name = "laser-host", version, about = "Spool interpreter for a laser cutter")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "laser.toml")]
    config: String,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    verbose: bool,

    /// Edge length of the demo square, in device steps
    #[arg(long, default_value_t = 1000)]
    demo_size: i32,
}

fn square(size: i32) -> Job {
    Job::lazy(move || {
        vec![
            Command::ModeProgram,
            Command::SetSpeed(35.0),
            Command::SetPower(650.0),
            Command::Move { x: 0, y: 0 },
            Command::LaserOn,
            Command::Cut { x: size, y: 0 },
            Command::Cut { x: size, y: size },
            Command::Cut { x: 0, y: size },
            Command::Cut { x: 0, y: 0 },
            Command::LaserOff,
            Command::WaitFinish,
            Command::ModeRapid,
            Command::signal("job;done", vec![json!("square"), json!(size)]),
        ]
    })
}

/// Reads the config file if present; `None` means fall back to defaults.
fn load(path: &str) -> krusty_laser::Result<Option<Config>> {
    if !Path::new(path).exists() {
        return Ok(None);
    }
    Ok(Some(config::load_config(path)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    let loaded = load(&args.config)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        config.log.level.parse().unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("Starting laser host");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if !found {
        tracing::warn!("Config '{}' not found; using defaults", args.config);
    }

    let context = Arc::new(HostContext::new(config.device.clone(), config.driver.event_capacity));
    let spooler = Arc::new(Spooler::new(context.clone()));
    let interpreter = Arc::new(Interpreter::new(SimulatedLaser::new(), spooler.clone(), context.clone()));

    let mut events = context.subscribe();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DeviceEvent::Shutdown) => break,
                Ok(event) => tracing::info!(event = event.name(), payload = %event.payload(), "Device event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Stands in for the controller draining its output buffer.
    let acker = interpreter.clone();
    let ack_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(5));
        loop {
            interval.tick().await;
            acker.with_backend(|laser| laser.acknowledge(1));
        }
    });

    spooler.enqueue(square(args.demo_size));
    spooler.enqueue(Job::command(Command::Home));
    if let RealtimeOutcome::Rejected(reason) = interpreter.realtime(RealtimeCommand::Status) {
        tracing::warn!("Status request rejected: {}", reason);
    }
    context.request_quit();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            let _ = ctrl_c_tx.send(());
        }
    });

    let period = Duration::from_millis(config.driver.tick_interval_ms);
    let stats = driver::run(interpreter.clone(), period, shutdown_rx).await;
    ack_task.abort();

    if !context.is_stopped() {
        context.stop();
    }
    let _ = event_task.await;

    let state = interpreter.state();
    tracing::info!(
        x = state.x,
        y = state.y,
        mode = %state.mode,
        ticks = stats.ticks,
        calls = interpreter.with_backend(|laser| laser.recorded()),
        "Laser host finished"
    );
    Ok(())
}
