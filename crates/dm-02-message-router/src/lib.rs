//! # DM-02 Message Router
//!
//! Routes agent messages between divisions and delivers them to handlers.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Validate, authorize and enqueue messages on per-division queues
//! - Deliver through concurrent workers with per-attempt deadlines
//! - Retry with exponential backoff, dead-letter once retries run out
//! - Expire messages whose TTL elapses before delivery
//! - Publish routed messages and alerts on the event bus
//!
//! ## Message Lifecycle
//!
//! ```text
//! pending ──► delivered
//!    │  ▲
//!    ▼  │ (retry)
//! failed ──► expired (ttl_expired | cancelled | retries_exhausted)
//!    ▲
//! pending ──► expired
//! ```
//!
//! Every status change appends one [`DeliveryReceipt`](shared_types::DeliveryReceipt).
//! Terminal statuses never change again.
//!
//! ## Module Structure
//!
//! ```text
//! dm-02-message-router/
//! ├── config.rs        # RouterConfig
//! ├── domain/          # ledger, retry policy, outcomes, errors
//! ├── ports/           # MessageRouterApi, MessageQueue, AgentRegistry, MessageHandler
//! ├── adapters/        # InMemoryMessageQueue, InMemoryAgentRegistry
//! └── service/         # MessageRouterService, delivery workers, sweeper
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{InMemoryAgentRegistry, InMemoryMessageQueue, QueueConfig};
pub use config::RouterConfig;
pub use domain::{
    DeadLetter, DeliveryContext, DeliveryOutcome, HandlerError, HandlerId, QueueAttributes,
    QueueError, RetryPolicy, RouteOutcome, RouterError, RouterResult,
};
pub use ports::{AgentRegistry, FnMessageHandler, MessageHandler, MessageQueue, MessageRouterApi};
pub use service::{
    MessageRouterService, MessageRouterServiceBuilder, SweepReport, DEAD_LETTER_ALERT,
    NO_HANDLER_ALERT,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
