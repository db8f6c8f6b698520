//! Settings store and event publisher shared by the spooler and interpreter.

use crate::config::DeviceSettings;
use crate::interpreter::MotionMode;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Everything the core publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    QueueLengthChanged(usize),
    ModeChanged(MotionMode),
    Status(String),
    Signal { name: String, args: Vec<Value> },
    Shutdown,
}

impl DeviceEvent {
    pub fn name(&self) -> &str {
        match self {
            DeviceEvent::QueueLengthChanged(_) => "queue_length_changed",
            DeviceEvent::ModeChanged(_) => "mode_changed",
            DeviceEvent::Status(_) => "status",
            DeviceEvent::Signal { .. } => "signal",
            DeviceEvent::Shutdown => "shutdown",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            DeviceEvent::QueueLengthChanged(len) => json!(len),
            DeviceEvent::ModeChanged(mode) => json!(mode.as_str()),
            DeviceEvent::Status(status) => json!(status),
            DeviceEvent::Signal { name, args } => json!({ "name": name, "args": args }),
            DeviceEvent::Shutdown => Value::Null,
        }
    }
}

/// Collaborator injected into the spooler and interpreter at construction.
pub trait Context: Send + Sync {
    fn publish(&self, event: DeviceEvent);

    /// Snapshot of the current settings.
    fn settings(&self) -> DeviceSettings;

    fn update_settings(&self, update: &mut dyn FnMut(&mut DeviceSettings));

    /// Whether the driver asked the interpreter to stop once the spool drains.
    fn quit_requested(&self) -> bool;

    fn stop(&self);
}

/// Broadcast event bus. Publishing never blocks and works without a runtime.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: DeviceEvent) {
        tracing::trace!(event = event.name(), payload = %event.payload(), "publish");
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }
}

/// In-process [`Context`]: an [`EventBus`] plus a lock-guarded settings store.
#[derive(Debug)]
pub struct HostContext {
    events: EventBus,
    settings: RwLock<DeviceSettings>,
    quit: AtomicBool,
    stopped: AtomicBool,
}

impl HostContext {
    pub fn new(settings: DeviceSettings, event_capacity: usize) -> Self {
        Self {
            events: EventBus::new(event_capacity),
            settings: RwLock::new(settings),
            quit: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new(DeviceSettings::default(), 256)
    }
}

impl Context for HostContext {
    fn publish(&self, event: DeviceEvent) {
        self.events.publish(event);
    }

    fn settings(&self) -> DeviceSettings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update_settings(&self, update: &mut dyn FnMut(&mut DeviceSettings)) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut settings);
    }

    fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::info!("Interpreter stopped: spool drained after quit request");
            self.events.publish(DeviceEvent::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_and_payloads() {
        assert_eq!(DeviceEvent::QueueLengthChanged(3).name(), "queue_length_changed");
        assert_eq!(DeviceEvent::QueueLengthChanged(3).payload(), json!(3));
        assert_eq!(DeviceEvent::ModeChanged(MotionMode::Program).payload(), json!("program"));
        let signal = DeviceEvent::Signal { name: "pipe;done".into(), args: vec![json!(1)] };
        assert_eq!(signal.payload(), json!({ "name": "pipe;done", "args": [1] }));
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.publish(DeviceEvent::Status("x=0".into()));
        let mut rx = bus.subscribe();
        bus.publish(DeviceEvent::Shutdown);
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::Shutdown);
    }

    #[test]
    fn test_settings_update_and_stop_once() {
        let context = HostContext::default();
        let mut rx = context.subscribe();
        context.update_settings(&mut |s| s.current_x = 42);
        assert_eq!(context.settings().current_x, 42);
        assert!(!context.quit_requested());
        context.request_quit();
        assert!(context.quit_requested());
        context.stop();
        context.stop();
        assert!(context.is_stopped());
        assert_eq!(rx.try_recv().unwrap(), DeviceEvent::Shutdown);
        assert!(rx.try_recv().is_err());
    }
}
