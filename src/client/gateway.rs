// HTTP gateway to the worker
//
// Stateless request/response facade over the worker API. Every operation
// except `health` checks the shared running flag first; `health` is the
// probe and must work while the flag is still false.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::config::{ClientConfig, WorkerConfig};
use crate::error::{AgentError, Result};
use crate::types::{HealthStatus, SearchEngine, Session, SessionList, TaskHandle, TaskOptions, TaskRequest};

pub struct TaskGateway {
    base_url: String,
    client: Client,
    running: Arc<AtomicBool>,
    api_key: Option<String>,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl TaskGateway {
    pub fn new(
        base_url: String,
        worker: &WorkerConfig,
        client_config: &ClientConfig,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let request_timeout = Duration::from_secs(client_config.request_timeout_secs);
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            base_url,
            client,
            running,
            api_key: worker.api_key.clone(),
            request_timeout,
            probe_timeout: Duration::from_secs(client_config.probe_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `GET /health`. Not gated by the running flag; failures are
    /// surfaced to the caller, never silently mapped to "not running".
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .request(Method::GET, "/health")
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| self.map_transport(e, self.probe_timeout))?;

        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Submit a task via `POST /agent/run`. The returned handle's `id` is
    /// the session identifier for event subscriptions.
    pub async fn submit_task(&self, request: &TaskRequest) -> Result<TaskHandle> {
        self.ensure_running()?;
        debug!(task = %request.task, "Submitting task");

        let response = self
            .request(Method::POST, "/agent/run")
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(e, self.request_timeout))?;

        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// List every session the worker knows about.
    pub async fn sessions(&self) -> Result<Vec<Session>> {
        self.ensure_running()?;
        let response = self
            .request(Method::GET, "/agent/sessions")
            .send()
            .await
            .map_err(|e| self.map_transport(e, self.request_timeout))?;

        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        let list: SessionList = response.json().await?;
        Ok(list.sessions)
    }

    /// Fetch one session by id.
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.ensure_running()?;
        let response = self
            .request(Method::GET, &format!("/agent/session/{}", session_id))
            .send()
            .await
            .map_err(|e| self.map_transport(e, self.request_timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AgentError::SessionNotFound(session_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(self.status_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Search convenience: formats the canonical instruction and submits it
    /// as a regular task. The engine only shapes the instruction text.
    pub async fn search(&self, query: &str, engine: SearchEngine) -> Result<TaskHandle> {
        let options = TaskOptions {
            headless: Some(false),
            ..Default::default()
        }
        .with_extra("keep_open", json!(false));
        self.submit_task(&TaskRequest::with_options(
            format!("search for {} on {}", query, engine),
            options,
        ))
        .await
    }

    /// Navigation convenience mirroring `search`, keeping the page open.
    pub async fn navigate(&self, url: &str) -> Result<TaskHandle> {
        let options = TaskOptions {
            headless: Some(false),
            ..Default::default()
        }
        .with_extra("keep_open", json!(true));
        self.submit_task(&TaskRequest::with_options(
            format!("navigate to {}", url),
            options,
        ))
        .await
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AgentError::NotRunning)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    fn map_transport(&self, error: reqwest::Error, waited: Duration) -> AgentError {
        if error.is_timeout() {
            AgentError::Timeout { waited }
        } else {
            AgentError::Http(error)
        }
    }

    async fn status_error(&self, response: reqwest::Response) -> AgentError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        AgentError::Request { status, message }
    }
}
