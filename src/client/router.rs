// Event routing for per-session streams
//
// Decodes inbound frames, routes them to the typed callback for their kind,
// always invokes the generic callback, and always publishes a process-wide
// observation on the broadcast channel. One malformed frame never terminates
// a session: decode errors are logged and dropped.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::{AgentEvent, EventKind};

/// Process-wide observations published by the control plane.
///
/// This is the explicit observer handle: worker exit, stream lifecycle, and
/// agent events all flow through one channel instead of an ambient emitter.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// A decoded event from a session stream, after callback delivery.
    Agent {
        session_id: String,
        event: AgentEvent,
    },
    /// Transport-level error on a session stream.
    StreamError {
        session_id: String,
        message: String,
    },
    /// A session stream closed (locally or by the worker).
    StreamClosed { session_id: String },
    /// The supervised worker process exited.
    WorkerExited { code: Option<i32> },
}

pub type DataCallback = Box<dyn Fn(&Value) + Send + Sync>;
pub type EventCallback = Box<dyn Fn(&AgentEvent) + Send + Sync>;

/// Handlers bound to one session subscription.
///
/// Any subset may be absent; an absent handler is silently skipped, never
/// substituted with a generic one. `on_event` receives every decoded event
/// in addition to the kind-specific handler.
#[derive(Default)]
pub struct SubscriptionCallbacks {
    pub on_progress: Option<DataCallback>,
    pub on_screenshot: Option<DataCallback>,
    pub on_done: Option<DataCallback>,
    pub on_error: Option<DataCallback>,
    pub on_event: Option<EventCallback>,
}

impl SubscriptionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress<F: Fn(&Value) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_screenshot<F: Fn(&Value) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_screenshot = Some(Box::new(f));
        self
    }

    pub fn on_done<F: Fn(&Value) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }

    pub fn on_error<F: Fn(&Value) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_event<F: Fn(&AgentEvent) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_event = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for SubscriptionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_screenshot", &self.on_screenshot.is_some())
            .field("on_done", &self.on_done.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

/// Decodes and fans out stream frames. Cheap to clone; all clones publish to
/// the same broadcast channel.
#[derive(Clone)]
pub struct EventRouter {
    events: broadcast::Sender<DaemonEvent>,
}

impl EventRouter {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    /// Subscribe to process-wide observations. Receivers that lag are
    /// dropped by the channel, not by us.
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.events.subscribe()
    }

    /// Route one raw frame from a session stream.
    ///
    /// Delivery is strict 1:1 per frame: the kind-specific callback (if
    /// bound) once, `on_event` (if bound) once, one broadcast observation.
    /// Malformed frames invoke nothing.
    pub fn dispatch(&self, session_id: &str, raw: &str, callbacks: &SubscriptionCallbacks) {
        let event: AgentEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Dropping malformed event frame");
                return;
            }
        };

        let typed = match event.kind {
            EventKind::Progress => &callbacks.on_progress,
            EventKind::Screenshot => &callbacks.on_screenshot,
            EventKind::Done => &callbacks.on_done,
            EventKind::Error => &callbacks.on_error,
        };
        if let Some(callback) = typed {
            callback(&event.data);
        }

        if let Some(callback) = &callbacks.on_event {
            callback(&event);
        }

        // No receivers is fine; the send result only reports that.
        let _ = self.events.send(DaemonEvent::Agent {
            session_id: session_id.to_string(),
            event,
        });
    }

    /// Publish a transport-level error for a session stream.
    pub fn stream_error(&self, session_id: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(session_id = %session_id, error = %message, "Event stream error");
        let _ = self.events.send(DaemonEvent::StreamError {
            session_id: session_id.to_string(),
            message,
        });
    }

    /// Publish that a session stream has closed.
    pub fn stream_closed(&self, session_id: &str) {
        debug!(session_id = %session_id, "Event stream closed");
        let _ = self.events.send(DaemonEvent::StreamClosed {
            session_id: session_id.to_string(),
        });
    }

    /// Publish that the worker process exited.
    pub fn worker_exited(&self, code: Option<i32>) {
        let _ = self.events.send(DaemonEvent::WorkerExited { code });
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callbacks(
        done: Arc<AtomicUsize>,
        every: Arc<AtomicUsize>,
    ) -> SubscriptionCallbacks {
        SubscriptionCallbacks::new()
            .on_done(move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .on_event(move |_| {
                every.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[test]
    fn test_dispatch_invokes_typed_and_generic_exactly_once() {
        let router = EventRouter::new(16);
        let done = Arc::new(AtomicUsize::new(0));
        let every = Arc::new(AtomicUsize::new(0));
        let callbacks = counting_callbacks(Arc::clone(&done), Arc::clone(&every));

        router.dispatch(
            "s1",
            r#"{"type":"done","data":{"result":"ok"},"timestamp":"t1"}"#,
            &callbacks,
        );

        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(every.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_skips_typed_callback_for_other_kinds() {
        let router = EventRouter::new(16);
        let done = Arc::new(AtomicUsize::new(0));
        let every = Arc::new(AtomicUsize::new(0));
        let callbacks = counting_callbacks(Arc::clone(&done), Arc::clone(&every));

        router.dispatch(
            "s1",
            r#"{"type":"progress","data":{"step":1},"timestamp":"t1"}"#,
            &callbacks,
        );

        // No on_progress bound: skipped silently, on_event still fires.
        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(every.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_drops_malformed_frames_without_callbacks() {
        let router = EventRouter::new(16);
        let done = Arc::new(AtomicUsize::new(0));
        let every = Arc::new(AtomicUsize::new(0));
        let callbacks = counting_callbacks(Arc::clone(&done), Arc::clone(&every));

        router.dispatch("s1", "not json at all", &callbacks);
        router.dispatch("s1", r#"{"data":{"missing":"type"}}"#, &callbacks);
        router.dispatch("s1", r#"{"type":"teleport","data":{}}"#, &callbacks);

        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(every.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_publishes_observation() {
        let router = EventRouter::new(16);
        let mut events = router.subscribe();

        router.dispatch(
            "s7",
            r#"{"type":"screenshot","data":{"path":"/tmp/shot.png"},"timestamp":"t2"}"#,
            &SubscriptionCallbacks::new(),
        );

        match events.recv().await.unwrap() {
            DaemonEvent::Agent { session_id, event } => {
                assert_eq!(session_id, "s7");
                assert_eq!(event.kind, EventKind::Screenshot);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_observations() {
        let router = EventRouter::new(16);
        let mut events = router.subscribe();

        router.stream_error("s1", "connection reset");
        router.stream_closed("s1");
        router.worker_exited(Some(1));

        assert!(matches!(
            events.recv().await.unwrap(),
            DaemonEvent::StreamError { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DaemonEvent::StreamClosed { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DaemonEvent::WorkerExited { code: Some(1) }
        ));
    }
}
