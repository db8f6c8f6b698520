// Realtime command path. Runs synchronously under the core lock and never
// touches the spool, except RESET which clears it.

use super::state::clamp_power;
use super::{Core, settle};
use crate::backend::{BackendError, HookResult, LaserBackend};
use crate::command::RealtimeCommand;
use crate::context::{Context, DeviceEvent};
use crate::spooler::Spooler;

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeOutcome {
    /// The interpreter or the backend acted on the command.
    Handled,
    /// Backend-only command and the backend lacks the hook.
    Unsupported,
    /// Invalid argument, or the backend refused.
    Rejected(String),
}

impl RealtimeOutcome {
    fn from_hook(result: HookResult) -> Self {
        match result {
            Ok(()) => RealtimeOutcome::Handled,
            Err(BackendError::Unsupported(_)) => RealtimeOutcome::Unsupported,
            Err(e) => RealtimeOutcome::Rejected(e.to_string()),
        }
    }
}

fn check_percent(percent: f64) -> Result<f64, RealtimeOutcome> {
    if percent.is_finite() && percent >= 0.0 {
        Ok(percent)
    } else {
        Err(RealtimeOutcome::Rejected(format!("invalid percentage {}", percent)))
    }
}

impl<B: LaserBackend> Core<B> {
    pub(super) fn realtime(
        &mut self,
        command: RealtimeCommand,
        context: &dyn Context,
        spooler: &Spooler,
    ) -> RealtimeOutcome {
        tracing::debug!(command = command.name(), "Realtime");
        let outcome = match command {
            RealtimeCommand::Pause => {
                let result = self.backend.pause();
                self.native(result, |core| core.paused = true)
            }
            RealtimeCommand::Resume => {
                let result = self.backend.resume();
                self.native(result, |core| core.paused = false)
            }
            RealtimeCommand::Reset => {
                settle("reset", self.backend.reset());
                self.reset();
                spooler.clear();
                tracing::info!("Interpreter reset");
                RealtimeOutcome::Handled
            }
            RealtimeCommand::Status => {
                context.publish(DeviceEvent::Status(self.status()));
                RealtimeOutcome::Handled
            }
            RealtimeCommand::Speed(speed) if speed.is_finite() && speed > 0.0 => {
                let result = self.backend.speed(speed);
                self.native(result, |core| core.settings.speed = speed)
            }
            RealtimeCommand::Speed(speed) => {
                RealtimeOutcome::Rejected(format!("invalid speed {}", speed))
            }
            RealtimeCommand::Power(power) => {
                let power = clamp_power(power);
                let result = self.backend.power(power);
                self.native(result, |core| core.settings.power = power)
            }
            RealtimeCommand::Overscan(overscan) => {
                let result = self.backend.overscan(overscan);
                self.native(result, |core| core.settings.overscan = Some(overscan))
            }
            RealtimeCommand::LaserEnable => {
                let result = self.backend.laser_enable();
                self.native(result, |core| core.settings.laser_enabled = true)
            }
            RealtimeCommand::LaserDisable => {
                let result = self.backend.laser_disable();
                self.native(result, |core| core.settings.laser_enabled = false)
            }
            RealtimeCommand::SpeedPercent(percent) => match check_percent(percent) {
                Ok(percent) => RealtimeOutcome::from_hook(self.backend.speed_percent(percent)),
                Err(rejected) => rejected,
            },
            RealtimeCommand::RapidPercent(percent) => match check_percent(percent) {
                Ok(percent) => RealtimeOutcome::from_hook(self.backend.rapid_percent(percent)),
                Err(rejected) => rejected,
            },
            RealtimeCommand::PowerPercent(percent) => match check_percent(percent) {
                Ok(percent) => RealtimeOutcome::from_hook(self.backend.power_percent(percent)),
                Err(rejected) => rejected,
            },
            RealtimeCommand::Rapid(speed) => RealtimeOutcome::from_hook(self.backend.rapid(speed)),
            RealtimeCommand::SafetyDoor => RealtimeOutcome::from_hook(self.backend.safety_door()),
            RealtimeCommand::JogCancel => RealtimeOutcome::from_hook(self.backend.jog_cancel()),
            RealtimeCommand::FloodCoolant(on) => {
                RealtimeOutcome::from_hook(self.backend.flood_coolant(on))
            }
            RealtimeCommand::MistCoolant(on) => {
                RealtimeOutcome::from_hook(self.backend.mist_coolant(on))
            }
        };
        if let RealtimeOutcome::Rejected(reason) = &outcome {
            tracing::warn!(command = command.name(), "Realtime command rejected: {}", reason);
        }
        outcome
    }

    /// Applies a command the interpreter implements itself. The backend can
    /// veto it; lacking the hook does not.
    fn native(&mut self, hook: HookResult, apply: impl FnOnce(&mut Self)) -> RealtimeOutcome {
        match hook {
            Ok(()) | Err(BackendError::Unsupported(_)) => {
                apply(self);
                RealtimeOutcome::Handled
            }
            Err(e) => RealtimeOutcome::Rejected(e.to_string()),
        }
    }

    pub(super) fn status(&self) -> String {
        format!(
            "x={:.6};y={:.6};speed={:.6};power={}",
            f64::from(self.state.x),
            f64::from(self.state.y),
            self.settings.speed,
            self.settings.power as i64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::context::HostContext;
    use std::sync::Arc;

    #[test]
    fn test_status_format() {
        let context = HostContext::default();
        let mut core = Core::new(NullBackend, &context);
        core.state.x = 12;
        core.state.y = -3;
        core.settings.power = 333.7;
        assert_eq!(core.status(), "x=12.000000;y=-3.000000;speed=20.000000;power=333");
    }

    #[test]
    fn test_null_backend_outcomes() {
        let context = Arc::new(HostContext::default());
        let spooler = Spooler::new(context.clone());
        let mut core = Core::new(NullBackend, context.as_ref());
        assert_eq!(core.realtime(RealtimeCommand::Pause, context.as_ref(), &spooler), RealtimeOutcome::Handled);
        assert!(core.paused);
        assert_eq!(
            core.realtime(RealtimeCommand::MistCoolant(true), context.as_ref(), &spooler),
            RealtimeOutcome::Unsupported
        );
        assert!(matches!(
            core.realtime(RealtimeCommand::SpeedPercent(f64::NAN), context.as_ref(), &spooler),
            RealtimeOutcome::Rejected(_)
        ));
        assert!(matches!(
            core.realtime(RealtimeCommand::Speed(-1.0), context.as_ref(), &spooler),
            RealtimeOutcome::Rejected(_)
        ));
        assert_eq!(core.realtime(RealtimeCommand::Power(4000.0), context.as_ref(), &spooler), RealtimeOutcome::Handled);
        assert_eq!(core.settings.power, 1000.0);
    }
}
