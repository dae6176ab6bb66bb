//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-memory implementations of the router's outbound ports.

mod agent_registry;
mod memory_queue;

pub use agent_registry::InMemoryAgentRegistry;
pub use memory_queue::{InMemoryMessageQueue, QueueConfig, MAX_RECEIVE_COUNT_EXCEEDED};
