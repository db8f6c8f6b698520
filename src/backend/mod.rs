// Capability interface between the interpreter and concrete laser hardware.
//
// Every hook defaults to `Unsupported`, so a backend only implements what its
// controller can do. The interpreter treats `Unsupported` as a consumed no-op.

pub mod sim;

pub use sim::SimulatedLaser;

use crate::command::{JogMode, PlotStep};
use crate::hold::Hold;
use crate::interpreter::{LaserSettings, MotionMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    #[error("Rejected by backend: {0}")]
    Rejected(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HookResult = Result<(), BackendError>;

fn unsupported(hook: &'static str) -> HookResult {
    Err(BackendError::Unsupported(hook))
}

pub trait LaserBackend: Send {
    /// Device-specific bulk drain, offered every unheld tick before the
    /// in-flight job. Returns whether it did work.
    fn process_batch(&mut self) -> bool {
        false
    }

    /// Predicate reporting that buffered output has not reached the device yet.
    /// Installed as a temporary hold by `WAIT_FINISH`.
    fn output_pending(&self) -> Option<Hold> {
        None
    }

    // Queued hooks

    fn laser_on(&mut self) -> HookResult { unsupported("laser_on") }
    fn laser_off(&mut self) -> HookResult { unsupported("laser_off") }
    fn laser_enable(&mut self) -> HookResult { unsupported("laser_enable") }
    fn laser_disable(&mut self) -> HookResult { unsupported("laser_disable") }

    fn cut(&mut self, _x: i32, _y: i32, _settings: &LaserSettings) -> HookResult {
        unsupported("cut")
    }

    /// Travel move. `rapid_between` asks the backend to leave program mode for it.
    fn move_to(&mut self, _x: i32, _y: i32, _rapid_between: bool) -> HookResult {
        unsupported("move")
    }

    fn jog(&mut self, _x: i32, _y: i32, _mode: JogMode, _min_jog: i32) -> HookResult {
        unsupported("jog")
    }

    fn home(&mut self) -> HookResult { unsupported("home") }
    fn lock_rail(&mut self) -> HookResult { unsupported("lock_rail") }
    fn unlock_rail(&mut self) -> HookResult { unsupported("unlock_rail") }
    fn plot_start(&mut self) -> HookResult { unsupported("plot_start") }

    fn plot(&mut self, _step: &PlotStep) -> HookResult {
        unsupported("plot")
    }

    fn set_directions(&mut self, _left: bool, _top: bool, _x_dir: bool, _y_dir: bool) -> HookResult {
        unsupported("set_directions")
    }

    /// Called after any `SET_*` command changed the laser settings.
    fn settings_changed(&mut self, _settings: &LaserSettings) -> HookResult {
        unsupported("settings_changed")
    }

    fn mode_changed(&mut self, _mode: MotionMode) -> HookResult {
        unsupported("mode_changed")
    }

    fn beep(&mut self) -> HookResult { unsupported("beep") }

    // Realtime hooks

    fn pause(&mut self) -> HookResult { unsupported("pause") }
    fn resume(&mut self) -> HookResult { unsupported("resume") }
    fn reset(&mut self) -> HookResult { unsupported("reset") }
    fn safety_door(&mut self) -> HookResult { unsupported("safety_door") }
    fn jog_cancel(&mut self) -> HookResult { unsupported("jog_cancel") }
    fn speed_percent(&mut self, _percent: f64) -> HookResult { unsupported("speed_percent") }
    fn speed(&mut self, _speed: f64) -> HookResult { unsupported("speed") }
    fn rapid_percent(&mut self, _percent: f64) -> HookResult { unsupported("rapid_percent") }
    fn rapid(&mut self, _speed: f64) -> HookResult { unsupported("rapid") }
    fn power_percent(&mut self, _percent: f64) -> HookResult { unsupported("power_percent") }
    fn power(&mut self, _power: f64) -> HookResult { unsupported("power") }
    fn overscan(&mut self, _overscan: f64) -> HookResult { unsupported("overscan") }
    fn flood_coolant(&mut self, _on: bool) -> HookResult { unsupported("flood_coolant") }
    fn mist_coolant(&mut self, _on: bool) -> HookResult { unsupported("mist_coolant") }
}

/// Backend with no capabilities at all. Every command becomes a state-only no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl LaserBackend for NullBackend {}
