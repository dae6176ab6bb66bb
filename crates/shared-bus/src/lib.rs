//! # Shared Bus - Event Dispatcher
//!
//! Pattern-based publish/subscribe, orthogonal to the point-to-point queue
//! path. Any component may publish a typed event; subscribed handlers (rules)
//! receive it when their event type, source and payload pattern match.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐   handle()   ┌───────────┐
//! │    Router    │ ────────────→ │  Event Bus   │ ───────────→ │  Rule A   │
//! │   Workers    │               │              │ ───────────→ │  Rule B   │
//! └──────────────┘               └──────────────┘              └───────────┘
//!                                        │ tap()
//!                                        ↓
//!                                  audit / tests
//! ```
//!
//! ## Guarantees
//!
//! - Every matching handler runs; failures and panics are isolated per handler.
//! - `subscribe`/`unsubscribe` are idempotent and safe during `publish`.
//! - Publishing never errors; the caller gets a [`PublishReport`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod pattern;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{
    BusEvent, EventFilter, AGENT_HEARTBEAT, AGENT_MESSAGE, MESH_EVENT_SOURCE, SYSTEM_EVENT,
};
pub use pattern::{FilterPattern, Matcher, PatternError};
pub use publisher::{EventPublisher, InMemoryEventBus, PublishReport};
pub use subscriber::{
    EventHandler, EventHandlerError, EventTap, FnEventHandler, SubscriptionError, SubscriptionId,
};

/// Maximum events to buffer per tap before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
