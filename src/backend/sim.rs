//! In-process laser backend.
//!
//! Records every hook call and models the controller's output buffer: each
//! motion hook adds one pending packet, which stays pending until the
//! simulated device acknowledges it. Only the most recent calls are kept.

use super::{BackendError, HookResult, LaserBackend};
use crate::command::{JogMode, PlotStep};
use crate::hold::Hold;
use crate::interpreter::{LaserSettings, MotionMode};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of hook calls retained by [`SimulatedLaser::new`].
pub const DEFAULT_CALL_LIMIT: usize = 1024;

#[derive(Debug)]
pub struct SimulatedLaser {
    calls: VecDeque<String>,
    call_limit: usize,
    recorded: u64,
    pending: Arc<AtomicUsize>,
    position: (i32, i32),
    firing: bool,
}

impl Default for SimulatedLaser {
    fn default() -> Self {
        Self::with_call_limit(DEFAULT_CALL_LIMIT)
    }
}

impl SimulatedLaser {
    pub fn new() -> Self {
        tracing::info!("Simulated laser backend initialized");
        Self::default()
    }

    /// Keeps at most `limit` recent hook calls. Zero disables recording.
    pub fn with_call_limit(limit: usize) -> Self {
        Self {
            calls: VecDeque::with_capacity(limit.min(DEFAULT_CALL_LIMIT)),
            call_limit: limit,
            recorded: 0,
            pending: Arc::new(AtomicUsize::new(0)),
            position: (0, 0),
            firing: false,
        }
    }

    /// Retained hook calls, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.iter().cloned().collect()
    }

    /// Total hook calls, including those no longer retained.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn is_firing(&self) -> bool {
        self.firing
    }

    /// Shared counter of unacknowledged packets.
    pub fn pending_handle(&self) -> Arc<AtomicUsize> {
        self.pending.clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Acknowledges up to `packets` buffered packets; returns how many were acknowledged.
    pub fn acknowledge(&self, packets: usize) -> usize {
        let mut acked = 0;
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                acked = pending.min(packets);
                Some(pending - acked)
            });
        acked
    }

    fn record(&mut self, call: String) -> HookResult {
        tracing::debug!("Simulated laser <- {}", call);
        self.recorded += 1;
        if self.call_limit == 0 {
            return Ok(());
        }
        if self.calls.len() == self.call_limit {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
        Ok(())
    }

    fn emit(&mut self, call: String) -> HookResult {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.record(call)
    }
}

impl LaserBackend for SimulatedLaser {
    fn output_pending(&self) -> Option<Hold> {
        let pending = self.pending.clone();
        Some(Box::new(move || pending.load(Ordering::SeqCst) > 0))
    }

    fn laser_on(&mut self) -> HookResult {
        self.firing = true;
        self.record("laser_on".to_string())
    }

    fn laser_off(&mut self) -> HookResult {
        self.firing = false;
        self.record("laser_off".to_string())
    }

    fn laser_enable(&mut self) -> HookResult {
        self.record("laser_enable".to_string())
    }

    fn laser_disable(&mut self) -> HookResult {
        self.firing = false;
        self.record("laser_disable".to_string())
    }

    fn cut(&mut self, x: i32, y: i32, settings: &LaserSettings) -> HookResult {
        self.position = (x, y);
        self.emit(format!("cut {} {} speed={} power={}", x, y, settings.speed, settings.power))
    }

    fn move_to(&mut self, x: i32, y: i32, rapid_between: bool) -> HookResult {
        self.position = (x, y);
        self.emit(format!("move {} {} rapid={}", x, y, rapid_between))
    }

    fn jog(&mut self, x: i32, y: i32, mode: JogMode, min_jog: i32) -> HookResult {
        self.position = (x, y);
        self.emit(format!("jog {} {} {:?} min={}", x, y, mode, min_jog))
    }

    fn home(&mut self) -> HookResult {
        self.position = (0, 0);
        self.emit("home".to_string())
    }

    fn lock_rail(&mut self) -> HookResult {
        self.record("lock_rail".to_string())
    }

    fn unlock_rail(&mut self) -> HookResult {
        self.record("unlock_rail".to_string())
    }

    fn plot_start(&mut self) -> HookResult {
        self.record("plot_start".to_string())
    }

    fn plot(&mut self, step: &PlotStep) -> HookResult {
        self.position = (step.x, step.y);
        self.firing = step.laser_on;
        self.emit(format!("plot {} {} on={}", step.x, step.y, step.laser_on))
    }

    fn set_directions(&mut self, left: bool, top: bool, x_dir: bool, y_dir: bool) -> HookResult {
        self.record(format!("directions {} {} {} {}", left, top, x_dir, y_dir))
    }

    fn settings_changed(&mut self, settings: &LaserSettings) -> HookResult {
        self.record(format!("settings speed={} power={}", settings.speed, settings.power))
    }

    fn mode_changed(&mut self, mode: MotionMode) -> HookResult {
        self.record(format!("mode {}", mode))
    }

    fn beep(&mut self) -> HookResult {
        self.record("beep".to_string())
    }

    fn pause(&mut self) -> HookResult {
        self.record("pause".to_string())
    }

    fn resume(&mut self) -> HookResult {
        self.record("resume".to_string())
    }

    fn reset(&mut self) -> HookResult {
        self.pending.store(0, Ordering::SeqCst);
        self.firing = false;
        self.record("reset".to_string())
    }

    fn safety_door(&mut self) -> HookResult {
        self.firing = false;
        self.record("safety_door".to_string())
    }

    fn jog_cancel(&mut self) -> HookResult {
        self.record("jog_cancel".to_string())
    }

    fn speed_percent(&mut self, percent: f64) -> HookResult {
        self.record(format!("speed_percent {}", percent))
    }

    fn speed(&mut self, speed: f64) -> HookResult {
        self.record(format!("speed {}", speed))
    }

    fn rapid_percent(&mut self, percent: f64) -> HookResult {
        self.record(format!("rapid_percent {}", percent))
    }

    fn power_percent(&mut self, percent: f64) -> HookResult {
        if percent > 100.0 {
            return Err(BackendError::Rejected(format!(
                "tube cannot run at {}% power",
                percent
            )));
        }
        self.record(format!("power_percent {}", percent))
    }

    fn power(&mut self, power: f64) -> HookResult {
        self.record(format!("power {}", power))
    }

    fn overscan(&mut self, overscan: f64) -> HookResult {
        self.record(format!("overscan {}", overscan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_fills_output_buffer() {
        let mut laser = SimulatedLaser::new();
        laser.move_to(10, 10, true).unwrap();
        laser.cut(20, 10, &LaserSettings::default()).unwrap();
        assert_eq!(laser.pending(), 2);
        assert_eq!(laser.position(), (20, 10));
        let mut busy = laser.output_pending().unwrap();
        assert!(busy());
        assert_eq!(laser.acknowledge(5), 2);
        assert!(!busy());
    }

    #[test]
    fn test_call_log_keeps_most_recent() {
        let mut laser = SimulatedLaser::with_call_limit(2);
        laser.beep().unwrap();
        laser.home().unwrap();
        laser.lock_rail().unwrap();
        assert_eq!(laser.calls(), vec!["home", "lock_rail"]);
        assert_eq!(laser.recorded(), 3);

        let mut quiet = SimulatedLaser::with_call_limit(0);
        quiet.beep().unwrap();
        assert!(quiet.calls().is_empty());
        assert_eq!(quiet.recorded(), 1);
    }

    #[test]
    fn test_unsupported_hooks_report_as_such() {
        let mut laser = SimulatedLaser::new();
        assert!(matches!(laser.flood_coolant(true), Err(BackendError::Unsupported("flood_coolant"))));
        assert!(matches!(laser.rapid(100.0), Err(BackendError::Unsupported("rapid"))));
        assert!(matches!(laser.power_percent(150.0), Err(BackendError::Rejected(_))));
    }
}
