//! Spool interpreter.
//!
//! The [`Interpreter`] owns the device state and drains the [`Spooler`] one
//! step per [`tick`](Interpreter::tick). Queued commands go through the
//! dispatch table in `dispatch.rs`; realtime commands take the disjoint path
//! in `realtime.rs`. Both run under the same core lock, so a realtime command
//! issued from another thread never interleaves with a tick.
//!
//! Hold predicates run while that lock is held and must not call back into
//! the interpreter. `FUNCTION` callbacks are collected during dispatch and
//! invoked after the lock is released, so they may.

mod dispatch;
mod realtime;
pub mod state;

pub use dispatch::Dispatch;
pub use realtime::RealtimeOutcome;
pub use state::{DeviceState, LaserSettings, MAX_POWER, MotionMode, clamp_power};

use crate::backend::{BackendError, HookResult, LaserBackend};
use crate::command::{Callback, Command, JogMode, RealtimeCommand};
use crate::context::Context;
use crate::hold::{Hold, Holds};
use crate::job::{InFlight, Job, Pull};
use crate::spooler::Spooler;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing to do.
    Idle,
    /// A hold or pause blocked progress; the in-flight job is kept.
    Held,
    /// A command was dispatched, or the backend's batch hook did work.
    Processed,
    /// The in-flight stream ran out and the slot was cleared.
    Drained,
    /// The spool was empty after a quit request; the context was stopped.
    Stopped,
}

pub(crate) struct Core<B> {
    state: DeviceState,
    settings: LaserSettings,
    holds: Holds,
    paused: bool,
    in_flight: Option<InFlight>,
    rapid_between: bool,
    jog_mode: JogMode,
    callbacks: Vec<Callback>,
    backend: B,
}

impl<B: LaserBackend> Core<B> {
    fn new(backend: B, context: &dyn Context) -> Self {
        let registered = context.settings();
        Self {
            state: DeviceState::new(registered.current_x, registered.current_y),
            settings: LaserSettings::default(),
            holds: Holds::default(),
            paused: false,
            in_flight: None,
            rapid_between: registered.opt_rapid_between,
            jog_mode: JogMode::from_setting(registered.opt_jog_mode),
            callbacks: Vec::new(),
            backend,
        }
    }

    /// Normalizes a dequeued job into the in-flight slot. Returns false if the
    /// job offered nothing to run.
    fn load(&mut self, job: Job, context: &dyn Context) -> bool {
        let id = job.id();
        if job.is_plan() {
            let registered = context.settings();
            self.rapid_between = registered.opt_rapid_between;
            self.jog_mode = JogMode::from_setting(registered.opt_jog_mode);
        }
        match job.into_in_flight() {
            Some(in_flight) => {
                tracing::debug!(job = %id, "Job loaded");
                self.in_flight = Some(in_flight);
                true
            }
            None => {
                tracing::warn!(job = %id, "Dropping job: plan produced no commands");
                false
            }
        }
    }

    fn hold(&mut self) -> bool {
        let held = self.holds.check();
        held || self.paused
    }

    fn process(&mut self, context: &dyn Context) -> Tick {
        if self.hold() {
            return Tick::Held;
        }
        if self.backend.process_batch() {
            return Tick::Processed;
        }
        match self.in_flight.take() {
            None => Tick::Idle,
            Some(InFlight::Single(command)) => {
                if let Dispatch::Unrecognized(code) = self.dispatch(command, context) {
                    tracing::warn!(code, "Dropping job: unrecognized command code");
                }
                Tick::Processed
            }
            Some(InFlight::Stream(mut stream)) => match stream.pull() {
                Pull::Exhausted => Tick::Drained,
                Pull::Next(command) => {
                    match self.dispatch(command, context) {
                        Dispatch::Consumed => self.in_flight = Some(InFlight::Stream(stream)),
                        Dispatch::Unrecognized(code) => {
                            tracing::warn!(code, "Abandoning job: unrecognized command code");
                        }
                    }
                    Tick::Processed
                }
            },
        }
    }

    fn ensure_mode(&mut self, mode: MotionMode, context: &dyn Context) {
        if self.state.mode == mode {
            return;
        }
        self.state.mode = mode;
        tracing::debug!(%mode, "Motion mode changed");
        context.publish(crate::context::DeviceEvent::ModeChanged(mode));
        settle("mode_changed", self.backend.mode_changed(mode));
    }

    fn take_callbacks(&mut self) -> Vec<Callback> {
        std::mem::take(&mut self.callbacks)
    }

    /// Drops the in-flight job and every temporary hold, and lifts a pause.
    fn reset(&mut self) {
        self.in_flight = None;
        self.holds.clear_temporary();
        self.paused = false;
    }
}

/// Folds a queued hook result into "consumed": unsupported hooks and backend
/// failures are logged and otherwise ignored.
fn settle(hook: &str, result: HookResult) {
    match result {
        Ok(()) => {}
        Err(BackendError::Unsupported(name)) => {
            tracing::trace!(hook = name, "Backend hook unsupported; skipped");
        }
        Err(e) => tracing::warn!(hook, "Backend hook failed: {}", e),
    }
}

fn run_callbacks(callbacks: Vec<Callback>) {
    for callback in callbacks {
        callback.call();
    }
}

pub struct Interpreter<B: LaserBackend> {
    core: Mutex<Core<B>>,
    spooler: Arc<Spooler>,
    context: Arc<dyn Context>,
}

impl<B: LaserBackend> Interpreter<B> {
    pub fn new(backend: B, spooler: Arc<Spooler>, context: Arc<dyn Context>) -> Self {
        let core = Core::new(backend, context.as_ref());
        Self {
            core: Mutex::new(core),
            spooler,
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core<B>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn spooler(&self) -> &Arc<Spooler> {
        &self.spooler
    }

    /// Makes at most one unit of progress. Must not be called concurrently
    /// with itself; the driver owns the cadence.
    pub fn tick(&self) -> Tick {
        let (tick, callbacks) = {
            let mut core = self.lock();
            let tick = self.step(&mut core);
            (tick, core.take_callbacks())
        };
        run_callbacks(callbacks);
        tick
    }

    fn step(&self, core: &mut Core<B>) -> Tick {
        if core.in_flight.is_none() {
            let Some(job) = self.spooler.pop() else {
                if self.context.quit_requested() {
                    self.context.stop();
                    return Tick::Stopped;
                }
                return Tick::Idle;
            };
            if !core.load(job, self.context.as_ref()) {
                return Tick::Idle;
            }
        }
        core.process(self.context.as_ref())
    }

    /// Executes a queued-protocol command immediately, bypassing the spool.
    pub fn execute(&self, command: Command) -> Dispatch {
        let (dispatch, callbacks) = {
            let mut core = self.lock();
            let dispatch = core.dispatch(command, self.context.as_ref());
            (dispatch, core.take_callbacks())
        };
        run_callbacks(callbacks);
        dispatch
    }

    /// Executes a realtime command synchronously on the calling thread.
    pub fn realtime(&self, command: RealtimeCommand) -> RealtimeOutcome {
        self.lock()
            .realtime(command, self.context.as_ref(), &self.spooler)
    }

    /// Discards the in-flight job, all pending jobs and every temporary hold.
    pub fn reset(&self) {
        self.realtime(RealtimeCommand::Reset);
    }

    pub fn ensure_rapid_mode(&self) {
        self.lock().ensure_mode(MotionMode::Rapid, self.context.as_ref());
    }

    pub fn ensure_program_mode(&self) {
        self.lock().ensure_mode(MotionMode::Program, self.context.as_ref());
    }

    pub fn ensure_finished_mode(&self) {
        self.lock().ensure_mode(MotionMode::Finished, self.context.as_ref());
    }

    pub fn add_hold(&self, hold: Hold) {
        self.lock().holds.add(hold);
    }

    pub fn add_temp_hold(&self, hold: Hold) {
        self.lock().holds.add_temporary(hold);
    }

    /// Removes every permanent and temporary hold.
    pub fn clear_holds(&self) {
        self.lock().holds.clear();
    }

    pub fn hold_count(&self) -> usize {
        self.lock().holds.permanent_len()
    }

    pub fn temp_hold_count(&self) -> usize {
        self.lock().holds.temporary_len()
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn has_in_flight(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    pub fn settings(&self) -> LaserSettings {
        self.lock().settings.clone()
    }

    pub fn mode(&self) -> MotionMode {
        self.lock().state.mode
    }

    pub fn rapid_between(&self) -> bool {
        self.lock().rapid_between
    }

    /// Jog mode registered in the settings store, refreshed when a plan is
    /// dequeued. Queued JOG always dispatches [`JogMode::Default`]; backends
    /// that honor the registered mode read it from here.
    pub fn jog_mode(&self) -> JogMode {
        self.lock().jog_mode
    }

    pub fn set_prop(&self, mask: u32) {
        self.lock().state.set_prop(mask);
    }

    pub fn unset_prop(&self, mask: u32) {
        self.lock().state.unset_prop(mask);
    }

    pub fn toggle_prop(&self, mask: u32) {
        self.lock().state.toggle_prop(mask);
    }

    pub fn is_prop(&self, mask: u32) -> bool {
        self.lock().state.is_prop(mask)
    }

    /// Runs `f` against the backend under the core lock.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock().backend)
    }
}

impl<B: LaserBackend> std::fmt::Debug for Interpreter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.lock();
        f.debug_struct("Interpreter")
            .field("state", &core.state)
            .field("settings", &core.settings)
            .field("holds", &core.holds)
            .field("paused", &core.paused)
            .field("in_flight", &core.in_flight.is_some())
            .finish()
    }
}
