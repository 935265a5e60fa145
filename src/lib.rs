// Wheelhouse - local control plane for the browser automation worker
// Library exports

pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod types;

pub use client::{DaemonEvent, EventRouter, SessionRegistry, SubscriptionCallbacks, TaskGateway};
pub use daemon::{AgentDaemon, DaemonStatus, ProcessSupervisor};
pub use error::{AgentError, Result};
