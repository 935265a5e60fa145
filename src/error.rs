// Error taxonomy for the control plane
//
// Precondition and request errors are returned synchronously to the caller.
// Stream decode errors are logged and dropped by the event router. Worker
// crashes are observational (`DaemonEvent::WorkerExited`), never raised
// from an in-flight call.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker did not become ready within {waited:?}")]
    Timeout { waited: Duration },

    #[error("worker is not running")]
    NotRunning,

    #[error("worker returned {status}: {message}")]
    Request {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    // Internal only: swallowed by the event router, never surfaced to callers.
    #[error("malformed event frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("event stream error: {0}")]
    Stream(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
