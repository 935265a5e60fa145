// Worker-facing client: HTTP gateway, session registry, event router

pub mod gateway;
pub mod registry;
pub mod router;

pub use gateway::TaskGateway;
pub use registry::SessionRegistry;
pub use router::{DaemonEvent, EventRouter, SubscriptionCallbacks};
