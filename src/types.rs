// Wire types shared with the automation worker
//
// Shapes mirror the worker HTTP API (`/health`, `/agent/*`) and the JSON
// frames pushed on the per-session event stream.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot returned by `GET /health`. Transient; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub port: u16,
    pub host: String,
    /// Number of sessions the worker is tracking.
    pub sessions: u64,
    /// Number of open event-stream connections on the worker side.
    pub active_websockets: u64,
}

/// Options accepted by `POST /agent/run`.
///
/// Named fields cover the keys the worker documents; anything else goes
/// through the flattened passthrough map untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TaskOptions {
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Body of `POST /agent/run`. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub options: TaskOptions,
}

impl TaskRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            options: TaskOptions::default(),
        }
    }

    pub fn with_options(task: impl Into<String>, options: TaskOptions) -> Self {
        Self {
            task: task.into(),
            options,
        }
    }
}

/// Returned by `POST /agent/run` and `POST /agent/search`.
///
/// `id` is the worker-assigned session identifier used as the key for all
/// event-stream subscriptions. Timestamps are kept as the opaque strings the
/// worker produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub task: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// Session record returned by `GET /agent/session/{id}` and `/agent/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub task: String,
    pub status: SessionStatus,
    pub created_at: String,
    #[serde(default)]
    pub events: Vec<AgentEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<Session>,
}

/// Event kinds pushed on the per-session stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Screenshot,
    Done,
    Error,
}

/// One frame from the worker event stream.
///
/// A frame without a recognized `type` fails to parse and is dropped by the
/// router; `data` and `timestamp` are lenient since their shape is owned by
/// the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Engines accepted by `POST /agent/search`. Pure instruction formatting on
/// the worker side, not separate wire behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SearchEngine {
    #[default]
    Google,
    Bing,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Google => "google",
            SearchEngine::Bing => "bing",
        }
    }
}

impl std::fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_parses_wire_shape() {
        let event: AgentEvent = serde_json::from_str(
            r#"{"type":"done","data":{"result":"ok"},"timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Done);
        assert_eq!(event.data["result"], "ok");
    }

    #[test]
    fn test_event_missing_type_is_rejected() {
        let result = serde_json::from_str::<AgentEvent>(r#"{"data":{"step":1}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_task_options_passthrough_keys_flatten() {
        let options = TaskOptions {
            headless: Some(false),
            ..Default::default()
        }
        .with_extra("keep_open", json!(true));

        let body = serde_json::to_value(&options).unwrap();
        assert_eq!(body["headless"], false);
        assert_eq!(body["keep_open"], true);
        // Unset named fields stay off the wire.
        assert!(body.get("fast").is_none());
    }

    #[test]
    fn test_session_without_events_defaults_empty() {
        let session: Session = serde_json::from_value(json!({
            "id": "s1",
            "task": "search for rust",
            "status": "running",
            "created_at": "t0"
        }))
        .unwrap();
        assert!(session.events.is_empty());
        assert_eq!(session.status, SessionStatus::Running);
    }
}
