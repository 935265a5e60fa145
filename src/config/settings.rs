// Configuration structs

use serde::{Deserialize, Serialize};

/// Top-level configuration for the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// HTTP base URL for the worker API.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.worker.host, self.worker.port)
    }

    /// WebSocket base URL for the worker event stream.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.worker.host, self.worker.port)
    }
}

/// Where the worker binds and how to launch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Host the worker should bind (passed as AGENT_HOST).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the worker should bind (passed as AGENT_PORT).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Executable used to launch the worker.
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments for the worker executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional opaque credential forwarded to the worker as a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            command: default_command(),
            args: Vec::new(),
            api_key: None,
        }
    }
}

/// Client-side timeouts and probe cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout for gateway calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for an individual health probe, in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Total readiness wait after spawning the worker, in seconds.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    /// Sleep between readiness probes, in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4823
}

fn default_command() -> String {
    "agent-worker".to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_ready_timeout_secs() -> u64 {
    10
}

fn default_probe_interval_ms() -> u64 {
    250
}
