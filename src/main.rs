// Wheelhouse - local control plane for the browser automation worker
// Main entry point

use anyhow::{Context, Result};
use clap::Parser;

use wheelhouse::client::router::{DaemonEvent, SubscriptionCallbacks};
use wheelhouse::config::load_config;
use wheelhouse::daemon::AgentDaemon;
use wheelhouse::types::{EventKind, SearchEngine, TaskOptions, TaskRequest};

#[derive(Parser, Debug)]
#[command(name = "wheelhouse")]
#[command(about = "Local control plane for the browser automation worker", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Start the worker and supervise it until Ctrl-C
    Start,
    /// Show worker health and connection status
    Status,
    /// Run an automation task
    Run {
        /// Task instruction, e.g. "search for rust tutorials"
        task: String,
        /// Run the browser headless
        #[arg(long)]
        headless: bool,
        /// Prefer speed over fidelity
        #[arg(long)]
        fast: bool,
        /// Worker-side task timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Stream session events until the task finishes
        #[arg(long)]
        follow: bool,
    },
    /// Run a search task
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = SearchEngine::Google)]
        engine: SearchEngine,
    },
    /// Navigate the browser to a URL
    Navigate { url: String },
    /// List worker sessions
    Sessions,
    /// Show one session by id
    Session { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config().context("Failed to load configuration")?;
    let daemon = AgentDaemon::new(config).context("Failed to initialize control plane")?;

    match args.command {
        Command::Start => {
            daemon.start().await.context("Failed to start worker")?;
            let status = daemon.status();
            println!(
                "worker ready on {}:{} (pid {})",
                status.host,
                status.port,
                status
                    .worker_pid
                    .map(|pid| pid.to_string())
                    .unwrap_or_else(|| "external".to_string())
            );

            supervise_until_exit(&daemon).await;
        }
        Command::Status => {
            // Probe first so the status reflects an externally started worker.
            match daemon.health().await {
                Ok(health) => {
                    println!("worker: reachable on {}:{}", health.host, health.port);
                    println!("sessions: {}", health.sessions);
                    println!("active streams: {}", health.active_websockets);
                }
                Err(e) => println!("worker: unreachable ({})", e),
            }
        }
        Command::Run {
            task,
            headless,
            fast,
            timeout_ms,
            follow,
        } => {
            daemon.start().await.context("Worker is not available")?;
            let options = TaskOptions {
                headless: Some(headless),
                fast: fast.then_some(true),
                timeout_ms,
                ..Default::default()
            };
            let request = TaskRequest::with_options(task, options);
            if follow {
                follow_task(&daemon, &request).await?;
            } else {
                let handle = daemon.run_task(&request).await?;
                println!("session {} started at {}", handle.id, handle.created_at);
            }
        }
        Command::Search { query, engine } => {
            daemon.start().await.context("Worker is not available")?;
            let handle = daemon.search(&query, engine).await?;
            println!("session {} started at {}", handle.id, handle.created_at);
        }
        Command::Navigate { url } => {
            daemon.start().await.context("Worker is not available")?;
            let handle = daemon.navigate(&url).await?;
            println!("session {} started at {}", handle.id, handle.created_at);
        }
        Command::Sessions => {
            daemon.start().await.context("Worker is not available")?;
            let sessions = daemon.sessions().await?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            for session in sessions {
                println!("{}  {:?}  {}", session.id, session.status, session.task);
            }
        }
        Command::Session { id } => {
            daemon.start().await.context("Worker is not available")?;
            let session = daemon.session(&id).await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
    }

    Ok(())
}

/// Block until Ctrl-C or worker exit, then shut everything down.
async fn supervise_until_exit(daemon: &AgentDaemon) {
    let mut events = daemon.events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("shutting down");
                daemon.stop();
                break;
            }
            event = events.recv() => match event {
                Ok(DaemonEvent::WorkerExited { code }) => {
                    println!("worker exited with code {:?}", code);
                    daemon.stop();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }
}

/// Submit a task and print its event stream until it finishes.
async fn follow_task(daemon: &AgentDaemon, request: &TaskRequest) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let callbacks = SubscriptionCallbacks::new().on_event(move |event| {
        let _ = tx.send(event.clone());
    });

    let handle = daemon.run_with_events(request, callbacks).await?;
    println!("session {} started at {}", handle.id, handle.created_at);

    while let Some(event) = rx.recv().await {
        match event.kind {
            EventKind::Progress => println!("progress: {}", event.data),
            EventKind::Screenshot => println!("screenshot: {}", event.data),
            EventKind::Done => {
                println!("done: {}", event.data);
                break;
            }
            EventKind::Error => {
                println!("error: {}", event.data);
                break;
            }
        }
    }

    daemon.close(&handle.id);
    Ok(())
}
