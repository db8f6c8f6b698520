//! Host-side control core for a laser cutter.
//!
//! Producers put [`Job`]s on the [`Spooler`]; the [`Interpreter`] drains it
//! one step per tick and drives a [`LaserBackend`]. The [`driver`] module
//! supplies the tokio loop that owns the tick cadence.

pub mod backend;
pub mod command;
pub mod config;
pub mod context;
pub mod driver;
pub mod hold;
pub mod interpreter;
pub mod job;
pub mod spooler;

pub use backend::{BackendError, HookResult, LaserBackend, NullBackend, SimulatedLaser};
pub use command::{Command, CommandCode, JogMode, PlotStep, RealtimeCommand};
pub use config::{Config, ConfigError, DeviceSettings};
pub use context::{Context, DeviceEvent, EventBus, HostContext};
pub use hold::Hold;
pub use interpreter::{Dispatch, Interpreter, MotionMode, RealtimeOutcome, Tick};
pub use job::{CommandPlan, CommandStream, Job, JobId, JobKind, Pull};
pub use spooler::{Spooler, SpoolerError};

use thiserror::Error;

/// Crate-level error for callers that mix configuration, spool and backend failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Spooler error: {0}")]
    Spooler(#[from] SpoolerError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, Error>;
