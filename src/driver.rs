// src/driver.rs - Fixed-cadence tick loop
use crate::backend::LaserBackend;
use crate::interpreter::{Interpreter, Tick};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Counters collected while the driver runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub processed: u64,
    pub held: u64,
    pub idle: u64,
}

impl DriverStats {
    fn record(&mut self, tick: Tick) {
        self.ticks += 1;
        match tick {
            Tick::Processed | Tick::Drained => self.processed += 1,
            Tick::Held => self.held += 1,
            Tick::Idle | Tick::Stopped => self.idle += 1,
        }
    }
}

/// Shortest tick period the driver runs at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Calls [`Interpreter::tick`] once per `period` until the interpreter stops
/// or a shutdown message arrives. A zero period runs at [`MIN_PERIOD`].
pub async fn run<B: LaserBackend>(
    interpreter: Arc<Interpreter<B>>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> DriverStats {
    let period = if period.is_zero() {
        tracing::warn!("Zero tick period requested; using {:?}", MIN_PERIOD);
        MIN_PERIOD
    } else {
        period
    };
    let mut stats = DriverStats::default();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(period_ms = period.as_millis() as u64, "Tick driver started");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Tick driver shutting down");
                break;
            }
            _ = interval.tick() => {
                let tick = interpreter.tick();
                stats.record(tick);
                if tick == Tick::Stopped {
                    break;
                }
            }
        }
    }
    tracing::info!(
        ticks = stats.ticks,
        processed = stats.processed,
        held = stats.held,
        "Tick driver finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedLaser;
    use crate::command::Command;
    use crate::context::{Context, HostContext};
    use crate::job::Job;
    use crate::spooler::Spooler;

    #[tokio::test]
    async fn test_driver_runs_until_quit() {
        let context = Arc::new(HostContext::default());
        let spooler = Arc::new(Spooler::new(context.clone()));
        let interpreter = Arc::new(Interpreter::new(SimulatedLaser::new(), spooler.clone(), context.clone()));
        spooler.enqueue(Job::sequence(vec![Command::Move { x: 1, y: 1 }, Command::Cut { x: 2, y: 2 }]));
        context.request_quit();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = run(interpreter.clone(), Duration::from_millis(1), shutdown_rx).await;
        assert!(context.is_stopped());
        assert!(context.quit_requested());
        assert_eq!(stats.processed, 3);
        assert_eq!(interpreter.state().position(), (2, 2));
    }

    #[tokio::test]
    async fn test_zero_period_is_clamped() {
        let context = Arc::new(HostContext::default());
        let spooler = Arc::new(Spooler::new(context.clone()));
        let interpreter = Arc::new(Interpreter::new(SimulatedLaser::new(), spooler.clone(), context.clone()));
        spooler.enqueue(Job::command(Command::Home));
        context.request_quit();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let stats = run(interpreter, Duration::ZERO, shutdown_rx).await;
        assert_eq!(stats.processed, 1);
        assert!(context.is_stopped());
    }

    #[tokio::test]
    async fn test_driver_stops_on_shutdown_message() {
        let context = Arc::new(HostContext::default());
        let spooler = Arc::new(Spooler::new(context.clone()));
        let interpreter = Arc::new(Interpreter::new(SimulatedLaser::new(), spooler, context.clone()));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(interpreter, Duration::from_millis(1), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown_tx.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert!(stats.idle >= 1);
        assert!(!context.is_stopped());
    }
}
