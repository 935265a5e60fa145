// Session registry: one live event-stream connection per session id
//
// The id -> connection map is the only mutable shared state in the control
// plane. Subscribing again for the same id replaces the existing connection;
// closing an unknown id is a no-op.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::client::router::{EventRouter, SubscriptionCallbacks};
use crate::error::{AgentError, Result};

/// One open event-stream connection, keyed by session id in the registry.
///
/// The socket itself lives in the reader task; the registry entry holds the
/// close signal. Dropping the entry (close, replace) tells the reader to
/// shut the socket down.
struct SessionConnection {
    /// Distinguishes this connection from a replacement under the same id,
    /// so a replaced reader task cannot evict its successor's entry.
    epoch: u64,
    close_tx: watch::Sender<bool>,
}

pub struct SessionRegistry {
    connections: Arc<DashMap<String, SessionConnection>>,
    ws_base: String,
    router: EventRouter,
    running: Arc<AtomicBool>,
    next_epoch: AtomicU64,
}

impl SessionRegistry {
    pub fn new(ws_base: String, router: EventRouter, running: Arc<AtomicBool>) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            ws_base,
            router,
            running,
            next_epoch: AtomicU64::new(0),
        }
    }

    /// Open an event-stream connection for `session_id` and wire inbound
    /// frames to the router with the given callbacks.
    ///
    /// An existing connection for the same id is closed first. Fails with
    /// `NotRunning` while the worker is down and with `Stream` if the
    /// socket cannot be opened.
    pub async fn subscribe(
        &self,
        session_id: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AgentError::NotRunning);
        }

        // Replace, never duplicate.
        self.close(session_id);

        let url = format!("{}/events?id={}", self.ws_base, session_id);
        let (mut ws, _) = connect_async(url.as_str()).await?;
        debug!(session_id = %session_id, url = %url, "Event stream connected");

        let (close_tx, mut close_rx) = watch::channel(false);
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        self.connections
            .insert(session_id.to_string(), SessionConnection { epoch, close_tx });

        let connections = Arc::clone(&self.connections);
        let router = self.router.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // A dropped sender (close/replace removed the entry)
                    // counts as a close request too.
                    _ = close_rx.changed() => {
                        let _ = ws.close(None).await;
                        break;
                    }
                    frame = ws.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            router.dispatch(&session_id, &text, &callbacks);
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => router.dispatch(&session_id, &text, &callbacks),
                            Err(e) => {
                                warn!(session_id = %session_id, error = %e, "Dropping non-UTF-8 event frame");
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            router.stream_error(&session_id, e.to_string());
                            break;
                        }
                    }
                }
            }
            connections.remove_if(&session_id, |_, conn| conn.epoch == epoch);
            router.stream_closed(&session_id);
        });

        Ok(())
    }

    /// Close and remove the connection for `session_id`. Idempotent; closing
    /// an unknown id does nothing.
    pub fn close(&self, session_id: &str) {
        if let Some((_, conn)) = self.connections.remove(session_id) {
            info!(session_id = %session_id, "Closing event stream");
            let _ = conn.close_tx.send(true);
        }
    }

    /// Close every open connection, best-effort. Used on facade shutdown.
    pub fn close_all(&self) {
        let ids: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.close(&id);
        }
    }

    /// Number of open connections, for status reporting.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.connections.contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(running: bool) -> SessionRegistry {
        SessionRegistry::new(
            "ws://127.0.0.1:1".to_string(),
            EventRouter::new(16),
            Arc::new(AtomicBool::new(running)),
        )
    }

    #[test]
    fn test_close_unknown_id_is_a_noop() {
        let registry = registry(true);
        registry.close("never-subscribed");
        registry.close("never-subscribed");
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_close_all_on_empty_registry() {
        let registry = registry(true);
        registry.close_all();
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_requires_running_worker() {
        let registry = registry(false);
        let err = registry
            .subscribe("s1", SubscriptionCallbacks::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NotRunning));
    }
}
