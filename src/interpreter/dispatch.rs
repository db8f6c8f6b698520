// Queued command dispatch table.

use super::state::clamp_power;
use super::{Core, MotionMode, settle};
use crate::backend::LaserBackend;
use crate::command::{Command, JogMode};
use crate::context::{Context, DeviceEvent};
use crate::hold;
use std::time::Instant;

/// Result of dispatching one queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Executed, or skipped because the backend lacks the capability.
    Consumed,
    /// The raw opcode does not name an argument-free command.
    Unrecognized(u16),
}

impl<B: LaserBackend> Core<B> {
    pub(super) fn dispatch(&mut self, command: Command, context: &dyn Context) -> Dispatch {
        tracing::debug!(?command, "Dispatch");
        match command {
            Command::Raw(raw) => {
                return match Command::decode_raw(raw) {
                    Some(decoded) => self.dispatch(decoded, context),
                    None => Dispatch::Unrecognized(raw),
                };
            }
            Command::LaserOn => {
                self.state.laser_on = true;
                settle("laser_on", self.backend.laser_on());
            }
            Command::LaserOff => {
                self.state.laser_on = false;
                settle("laser_off", self.backend.laser_off());
            }
            Command::LaserEnable => {
                self.settings.laser_enabled = true;
                settle("laser_enable", self.backend.laser_enable());
            }
            Command::LaserDisable => {
                self.settings.laser_enabled = false;
                settle("laser_disable", self.backend.laser_disable());
            }
            Command::Cut { x, y } => {
                let (x, y) = self.advance(x, y, context);
                settle("cut", self.backend.cut(x, y, &self.settings));
            }
            Command::Move { x, y } => {
                let (x, y) = self.advance(x, y, context);
                settle("move", self.backend.move_to(x, y, self.rapid_between));
            }
            Command::Jog { x, y } => self.jog(x, y, JogMode::Default, context),
            Command::JogSwitch { x, y } => self.jog(x, y, JogMode::Switch, context),
            Command::JogFinish { x, y } => self.jog(x, y, JogMode::Finish, context),
            Command::Home => {
                self.place(0, 0, context);
                settle("home", self.backend.home());
            }
            Command::Lock => settle("lock_rail", self.backend.lock_rail()),
            Command::Unlock => settle("unlock_rail", self.backend.unlock_rail()),
            Command::Plot(step) => settle("plot", self.backend.plot(&step)),
            Command::PlotStart => settle("plot_start", self.backend.plot_start()),
            Command::SetSpeed(speed) => self.update_settings(|s| s.speed = speed),
            Command::SetPower(power) | Command::SetPpi(power) | Command::SetPwm(power) => {
                self.update_settings(|s| s.power = clamp_power(power))
            }
            Command::SetStep(step) => self.update_settings(|s| s.raster_step = step),
            Command::SetOverscan(overscan) => self.update_settings(|s| s.overscan = Some(overscan)),
            Command::SetAcceleration(accel) => self.update_settings(|s| s.acceleration = Some(accel)),
            Command::SetDRatio(ratio) => self.update_settings(|s| s.d_ratio = Some(ratio)),
            Command::SetDirection { left, top, x_dir, y_dir } => {
                settle("set_directions", self.backend.set_directions(left, top, x_dir, y_dir));
            }
            Command::SetIncremental => self.state.relative = true,
            Command::SetAbsolute => self.state.relative = false,
            Command::SetPosition { x, y } => self.place(x, y, context),
            Command::ModeRapid => self.ensure_mode(MotionMode::Rapid, context),
            Command::ModeProgram => self.ensure_mode(MotionMode::Program, context),
            Command::ModeFinished => self.ensure_mode(MotionMode::Finished, context),
            Command::Wait(duration) => {
                self.holds.add_temporary(hold::until(Instant::now() + duration));
            }
            Command::WaitFinish => match self.backend.output_pending() {
                Some(busy) => self.holds.add_temporary(busy),
                None => tracing::trace!("Backend has no output-pending check; WAIT_FINISH skipped"),
            },
            Command::Beep => settle("beep", self.backend.beep()),
            Command::Function(callback) => self.callbacks.push(callback),
            Command::Signal { name, args } => context.publish(DeviceEvent::Signal { name, args }),
        }
        Dispatch::Consumed
    }

    /// Resolves a motion target against relative mode and moves there.
    fn advance(&mut self, x: i32, y: i32, context: &dyn Context) -> (i32, i32) {
        let (x, y) = if self.state.relative {
            (self.state.x.saturating_add(x), self.state.y.saturating_add(y))
        } else {
            (x, y)
        };
        self.place(x, y, context);
        (x, y)
    }

    /// Records the position in device state and in the settings store.
    fn place(&mut self, x: i32, y: i32, context: &dyn Context) {
        self.state.x = x;
        self.state.y = y;
        context.update_settings(&mut |s| {
            s.current_x = x;
            s.current_y = y;
        });
    }

    fn jog(&mut self, x: i32, y: i32, mode: JogMode, context: &dyn Context) {
        let min_jog = context.settings().opt_jog_minimum;
        let (x, y) = self.advance(x, y, context);
        settle("jog", self.backend.jog(x, y, mode, min_jog));
    }

    fn update_settings(&mut self, update: impl FnOnce(&mut super::LaserSettings)) {
        update(&mut self.settings);
        settle("settings_changed", self.backend.settings_changed(&self.settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::context::HostContext;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn core() -> (Core<NullBackend>, HostContext) {
        let context = HostContext::default();
        (Core::new(NullBackend, &context), context)
    }

    #[test]
    fn test_power_like_setters_clamp() {
        let (mut core, context) = core();
        core.dispatch(Command::SetPower(1500.0), &context);
        assert_eq!(core.settings.power, 1000.0);
        core.dispatch(Command::SetPpi(-5.0), &context);
        assert_eq!(core.settings.power, 0.0);
        core.dispatch(Command::SetPwm(500.0), &context);
        assert_eq!(core.settings.power, 500.0);
    }

    #[test]
    fn test_missing_backend_hooks_are_consumed() {
        let (mut core, context) = core();
        for command in [Command::Cut { x: 3, y: 4 }, Command::Beep, Command::Lock, Command::PlotStart] {
            assert_eq!(core.dispatch(command, &context), Dispatch::Consumed);
        }
        assert_eq!(core.state.position(), (3, 4));
        assert_eq!(context.settings().current_x, 3);
        assert_eq!(context.settings().current_y, 4);
    }

    #[test]
    fn test_relative_motion_offsets_from_current_position() {
        let (mut core, context) = core();
        core.dispatch(Command::Move { x: 10, y: 10 }, &context);
        core.dispatch(Command::SetIncremental, &context);
        core.dispatch(Command::Cut { x: 5, y: -2 }, &context);
        assert_eq!(core.state.position(), (15, 8));
        core.dispatch(Command::SetAbsolute, &context);
        core.dispatch(Command::Move { x: 1, y: 1 }, &context);
        assert_eq!(core.state.position(), (1, 1));
    }

    #[test]
    fn test_raw_codes() {
        let (mut core, context) = core();
        let laser_on = crate::command::CommandCode::LaserOn as u16;
        assert_eq!(core.dispatch(Command::Raw(laser_on), &context), Dispatch::Consumed);
        assert!(core.state.laser_on);
        assert_eq!(core.dispatch(Command::Raw(9999), &context), Dispatch::Unrecognized(9999));
    }

    #[test]
    fn test_signal_and_function() {
        let (mut core, context) = core();
        let mut rx = context.subscribe();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        core.dispatch(Command::function(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }), &context);
        core.dispatch(Command::signal("job;done", vec![json!("square")]), &context);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        for callback in core.take_callbacks() {
            callback.call();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            DeviceEvent::Signal { name: "job;done".into(), args: vec![json!("square")] }
        );
    }

    #[test]
    fn test_wait_finish_without_pending_check_adds_no_hold() {
        let (mut core, context) = core();
        core.dispatch(Command::WaitFinish, &context);
        assert_eq!(core.holds.temporary_len(), 0);
        core.dispatch(Command::Wait(std::time::Duration::from_secs(30)), &context);
        assert_eq!(core.holds.temporary_len(), 1);
    }
}
