// Daemon facade
//
// Composition root for the control plane: sequences supervisor -> readiness
// probe, then exposes the gateway, registry, and router as one API behind a
// single running flag.

pub mod probe;
pub mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::client::router::{DaemonEvent, EventRouter, SubscriptionCallbacks};
use crate::client::{SessionRegistry, TaskGateway};
use crate::config::Config;
use crate::error::Result;
use crate::types::{HealthStatus, SearchEngine, Session, TaskHandle, TaskRequest};

pub use probe::wait_until_ready;
pub use supervisor::ProcessSupervisor;

/// Snapshot of the control plane itself (not a worker probe).
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub host: String,
    pub port: u16,
    pub active_connections: usize,
    pub worker_pid: Option<u32>,
    pub worker_started_at: Option<DateTime<Utc>>,
}

/// The control plane for one automation worker.
///
/// The running flag is true iff the supervisor holds a live process (or an
/// externally started worker answered the probe) and the last readiness
/// check succeeded. It gates new gateway and subscribe calls only; requests
/// already in flight when the worker crashes complete or fail on their own.
pub struct AgentDaemon {
    config: Config,
    running: Arc<AtomicBool>,
    router: EventRouter,
    supervisor: ProcessSupervisor,
    gateway: TaskGateway,
    registry: SessionRegistry,
}

impl AgentDaemon {
    pub fn new(config: Config) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(false));
        let router = EventRouter::default();
        let supervisor = ProcessSupervisor::new(Arc::clone(&running), router.clone());
        let gateway = TaskGateway::new(
            config.base_url(),
            &config.worker,
            &config.client,
            Arc::clone(&running),
        )?;
        let registry = SessionRegistry::new(
            config.ws_url(),
            router.clone(),
            Arc::clone(&running),
        );
        Ok(Self {
            config,
            running,
            router,
            supervisor,
            gateway,
            registry,
        })
    }

    /// Subscribe to process-wide observations: agent events, stream
    /// lifecycle, worker exit.
    pub fn events(&self) -> broadcast::Receiver<DaemonEvent> {
        self.router.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the worker and wait for it to become ready.
    ///
    /// If a worker already answers the health probe (started externally or
    /// by a previous call), no second process is spawned. On a readiness
    /// timeout the spawned process is deliberately left running and the
    /// error returned; remediation is the caller's decision.
    pub async fn start(&self) -> Result<()> {
        if let Ok(health) = self.gateway.health().await {
            if health.ok {
                info!("Worker already running, skipping spawn");
                self.running.store(true, Ordering::SeqCst);
                return Ok(());
            }
        }

        self.supervisor.start(&self.config.worker)?;

        let timeout = Duration::from_secs(self.config.client.ready_timeout_secs);
        let interval = Duration::from_millis(self.config.client.probe_interval_ms);
        wait_until_ready(|| self.gateway.health(), timeout, interval).await?;

        self.running.store(true, Ordering::SeqCst);
        info!(url = %self.gateway.base_url(), "Worker ready");
        Ok(())
    }

    /// Shut down: close every event stream, then signal the worker to
    /// terminate. Non-blocking; the running flag flips false regardless of
    /// exit confirmation, which arrives later as `WorkerExited`.
    pub fn stop(&self) {
        self.registry.close_all();
        self.supervisor.stop();
        self.running.store(false, Ordering::SeqCst);
        info!("Control plane stopped");
    }

    /// Pass-through health probe. Failures are surfaced, not mapped to a
    /// "not running" default.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.gateway.health().await
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            running: self.is_running(),
            host: self.config.worker.host.clone(),
            port: self.config.worker.port,
            active_connections: self.registry.count(),
            worker_pid: self.supervisor.pid(),
            worker_started_at: self.supervisor.started_at(),
        }
    }

    pub async fn run_task(&self, request: &TaskRequest) -> Result<TaskHandle> {
        self.gateway.submit_task(request).await
    }

    /// Submit a task and immediately subscribe to its event stream.
    pub async fn run_with_events(
        &self,
        request: &TaskRequest,
        callbacks: SubscriptionCallbacks,
    ) -> Result<TaskHandle> {
        let handle = self.gateway.submit_task(request).await?;
        self.registry.subscribe(&handle.id, callbacks).await?;
        Ok(handle)
    }

    pub async fn search(&self, query: &str, engine: SearchEngine) -> Result<TaskHandle> {
        self.gateway.search(query, engine).await
    }

    pub async fn navigate(&self, url: &str) -> Result<TaskHandle> {
        self.gateway.navigate(url).await
    }

    pub async fn sessions(&self) -> Result<Vec<Session>> {
        self.gateway.sessions().await
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.gateway.session(session_id).await
    }

    pub async fn subscribe(
        &self,
        session_id: &str,
        callbacks: SubscriptionCallbacks,
    ) -> Result<()> {
        self.registry.subscribe(session_id, callbacks).await
    }

    pub fn close(&self, session_id: &str) {
        self.registry.close(session_id)
    }

    pub fn close_all(&self) {
        self.registry.close_all()
    }
}
