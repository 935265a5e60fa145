// Worker process supervision
//
// Owns the worker child process: spawns it with the host/port environment
// overlay, forwards its output to the log, and watches for exit. A crash is
// terminal until an operator starts the worker again; there is no respawn
// loop that could mask a persistent failure.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::router::EventRouter;
use crate::config::WorkerConfig;
use crate::error::{AgentError, Result};

struct WorkerHandle {
    pid: u32,
    started_at: DateTime<Utc>,
    term_tx: watch::Sender<bool>,
}

pub struct ProcessSupervisor {
    handle: Arc<Mutex<Option<WorkerHandle>>>,
    running: Arc<AtomicBool>,
    router: EventRouter,
}

impl ProcessSupervisor {
    pub fn new(running: Arc<AtomicBool>, router: EventRouter) -> Self {
        Self {
            handle: Arc::new(Mutex::new(None)),
            running,
            router,
        }
    }

    /// Spawn the worker process. Idempotent: if a worker is already held,
    /// its pid is returned without spawning a second one.
    ///
    /// The bind address is handed to the worker through `AGENT_HOST` /
    /// `AGENT_PORT`. Exit is observed asynchronously by a watcher task that
    /// clears the handle, flips the running flag false, and publishes
    /// `DaemonEvent::WorkerExited`.
    pub fn start(&self, worker: &WorkerConfig) -> Result<u32> {
        if let Some(handle) = self.handle.lock().unwrap().as_ref() {
            info!(pid = handle.pid, "Worker already supervised");
            return Ok(handle.pid);
        }

        let mut child = Command::new(&worker.command)
            .args(&worker.args)
            .env("AGENT_HOST", &worker.host)
            .env("AGENT_PORT", worker.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(AgentError::Spawn)?;

        let pid = child.id().ok_or_else(|| {
            AgentError::Spawn(io::Error::new(
                io::ErrorKind::Other,
                "worker exited before a pid could be read",
            ))
        })?;
        info!(pid, command = %worker.command, "Worker spawned");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(target: "worker", "{}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "worker", "{}", line);
                }
            });
        }

        let (term_tx, mut term_rx) = watch::channel(false);
        *self.handle.lock().unwrap() = Some(WorkerHandle {
            pid,
            started_at: Utc::now(),
            term_tx,
        });

        let handle = Arc::clone(&self.handle);
        let running = Arc::clone(&self.running);
        let router = self.router.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = term_rx.changed() => {
                    terminate(&mut child, pid);
                    child.wait().await
                }
            };

            let code = status.ok().and_then(|s| s.code());
            handle.lock().unwrap().take();
            running.store(false, Ordering::SeqCst);
            match code {
                Some(0) => info!(pid, "Worker exited cleanly"),
                Some(code) => warn!(pid, code, "Worker exited abnormally"),
                None => warn!(pid, "Worker terminated by signal"),
            }
            router.worker_exited(code);
        });

        Ok(pid)
    }

    /// Request graceful termination. Fire-and-forget: exit confirmation
    /// arrives through the watcher, not here.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().as_ref() {
            info!(pid = handle.pid, "Stopping worker");
            let _ = handle.term_tx.send(true);
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.lock().unwrap().as_ref().map(|h| h.pid)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.handle.lock().unwrap().as_ref().map(|h| h.started_at)
    }

    pub fn has_child(&self) -> bool {
        self.handle.lock().unwrap().is_some()
    }
}

/// Graceful termination: SIGTERM on unix so the worker can clean up its
/// browser sessions, hard kill elsewhere (and as the unix fallback).
#[cfg(unix)]
fn terminate(child: &mut Child, pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_err() {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::router::DaemonEvent;
    use std::time::Duration;

    fn supervisor() -> (ProcessSupervisor, EventRouter, Arc<AtomicBool>) {
        let running = Arc::new(AtomicBool::new(true));
        let router = EventRouter::new(16);
        let supervisor = ProcessSupervisor::new(Arc::clone(&running), router.clone());
        (supervisor, router, running)
    }

    fn shell(script: &str) -> WorkerConfig {
        WorkerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            ..Default::default()
        }
    }

    async fn next_exit(events: &mut tokio::sync::broadcast::Receiver<DaemonEvent>) -> Option<i32> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for worker exit")
                .unwrap();
            if let DaemonEvent::WorkerExited { code } = event {
                return code;
            }
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_a_spawn_error() {
        let (supervisor, _router, _running) = supervisor();
        let worker = WorkerConfig {
            command: "definitely-not-a-real-binary".to_string(),
            ..Default::default()
        };
        let err = supervisor.start(&worker).unwrap_err();
        assert!(matches!(err, AgentError::Spawn(_)));
        assert!(!supervisor.has_child());
    }

    #[tokio::test]
    async fn test_exit_clears_handle_and_flips_running_flag() {
        let (supervisor, router, running) = supervisor();
        let mut events = router.subscribe();

        supervisor.start(&shell("exit 7")).unwrap();
        assert_eq!(next_exit(&mut events).await, Some(7));
        assert!(!supervisor.has_child());
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_terminates_a_long_running_worker() {
        let (supervisor, router, _running) = supervisor();
        let mut events = router.subscribe();

        supervisor.start(&shell("sleep 30")).unwrap();
        assert!(supervisor.pid().is_some());
        assert!(supervisor.started_at().is_some());

        supervisor.stop();
        // SIGTERM, so no exit code.
        assert_eq!(next_exit(&mut events).await, None);
        assert!(!supervisor.has_child());
        assert!(supervisor.started_at().is_none());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_worker_lives() {
        let (supervisor, router, _running) = supervisor();
        let mut events = router.subscribe();

        let first = supervisor.start(&shell("sleep 30")).unwrap();
        let second = supervisor.start(&shell("sleep 30")).unwrap();
        assert_eq!(first, second);

        supervisor.stop();
        next_exit(&mut events).await;
    }
}
