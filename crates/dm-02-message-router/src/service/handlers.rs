//! Handler registry.
//!
//! Handlers are kept in registration order; the first one registered for
//! the message's type whose `can_handle` accepts it receives the message.

use crate::domain::HandlerId;
use crate::ports::MessageHandler;
use parking_lot::RwLock;
use shared_types::{AgentMessage, MessageType};
use std::sync::Arc;

struct Registration {
    id: HandlerId,
    message_type: MessageType,
    handler: Arc<dyn MessageHandler>,
}

/// Registered message handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    registrations: RwLock<Vec<Registration>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `message_type`.
    pub fn register(&self, message_type: MessageType, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId::generate();
        self.registrations.write().push(Registration {
            id: id.clone(),
            message_type,
            handler,
        });
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unregister(&self, id: &HandlerId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.id != *id);
        registrations.len() != before
    }

    /// First handler accepting `message`.
    pub fn find(&self, message: &AgentMessage) -> Option<Arc<dyn MessageHandler>> {
        self.registrations
            .read()
            .iter()
            .find(|r| r.message_type == message.message_type && r.handler.can_handle(message))
            .map(|r| Arc::clone(&r.handler))
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// True when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }
}
