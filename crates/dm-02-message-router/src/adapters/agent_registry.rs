//! In-memory Agent Registry.

use crate::domain::RouterResult;
use crate::ports::AgentRegistry;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::AgentRecord;
use std::collections::HashMap;

/// Agent records kept in process memory, keyed by agent id.
#[derive(Debug, Default)]
pub struct InMemoryAgentRegistry {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl InMemoryAgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `record.agent_id`.
    pub fn register(&self, record: AgentRecord) {
        self.agents.write().insert(record.agent_id.clone(), record);
    }

    /// Remove an agent. Returns `false` if it was unknown.
    pub fn deregister(&self, agent_id: &str) -> bool {
        self.agents.write().remove(agent_id).is_some()
    }

    /// Agents owned by `division_id`.
    pub fn agents_in(&self, division_id: &str) -> Vec<AgentRecord> {
        let mut agents: Vec<_> = self
            .agents
            .read()
            .values()
            .filter(|a| a.division_id == division_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn lookup_agent(&self, agent_id: &str) -> RouterResult<Option<AgentRecord>> {
        Ok(self.agents.read().get(agent_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent_id: &str, division_id: &str) -> AgentRecord {
        AgentRecord {
            agent_id: agent_id.into(),
            division_id: division_id.into(),
            endpoint: format!("local://{agent_id}"),
            permissions: vec![],
            is_shareable: true,
        }
    }

    #[tokio::test]
    async fn test_register_lookup_deregister() {
        let registry = InMemoryAgentRegistry::new();
        assert_eq!(registry.lookup_agent("x").await.unwrap(), None);

        registry.register(record("x", "div-b"));
        registry.register(record("y", "div-b"));
        registry.register(record("z", "div-c"));

        let found = registry.lookup_agent("x").await.unwrap().unwrap();
        assert_eq!(found.division_id, "div-b");

        let ids: Vec<_> = registry
            .agents_in("div-b")
            .into_iter()
            .map(|a| a.agent_id)
            .collect();
        assert_eq!(ids, vec!["x", "y"]);

        assert!(registry.deregister("x"));
        assert!(!registry.deregister("x"));
    }
}
