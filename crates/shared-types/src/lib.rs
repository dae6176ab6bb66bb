//! # Shared Types Crate
//!
//! The message model shared by every Division Mesh component.
//!
//! ## Contents
//!
//! - **Message**: `AgentMessage`, its type and status state machine
//! - **Receipt**: `DeliveryReceipt`, one per delivery attempt
//! - **Cross-division**: gateway request/response pair
//! - **Division**: permissions, trust entries, registry records
//! - **Time**: `TimeSource` abstraction and a token-bucket limiter
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: types crossing crate boundaries live here.
//! - **Fixed at creation**: `message_id`, `timestamp`, `ttl` and `expires_at`
//!   cannot be changed after construction.
//! - **Guarded lifecycle**: status only moves along the documented edges.

pub mod cross_division;
pub mod division;
pub mod errors;
pub mod message;
pub mod rate_limiter;
pub mod receipt;
pub mod time;

pub use cross_division::{CrossDivisionRequest, CrossDivisionResponse};
pub use division::{AgentRecord, DivisionPermissions, TrustEntry};
pub use errors::MessageError;
pub use message::{AgentMessage, MessageBuilder, MessageStatus, MessageType};
pub use rate_limiter::RateLimiter;
pub use receipt::DeliveryReceipt;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};
