//! Registry of known worker agents.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{AgentDescriptor, HealthState, WorkUnit};

/// Holds the set of known worker agents keyed by id.
///
/// The dispatcher works from read-only snapshots; the health monitor is the
/// only writer of agent status. A status read that is stale by one probe
/// interval is acceptable.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<BTreeMap<String, AgentDescriptor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register an agent. Fails with `DuplicateId` if the id is already
    /// present, leaving the registry unchanged.
    pub async fn register(&self, descriptor: AgentDescriptor) -> OrchestratorResult<()> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&descriptor.id) {
            return Err(OrchestratorError::DuplicateId(descriptor.id));
        }
        debug!(agent = %descriptor.id, address = %descriptor.address, "registering agent");
        agents.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Remove an agent. Idempotent: removing an unknown id is a no-op.
    pub async fn unregister(&self, id: &str) {
        let mut agents = self.agents.write().await;
        if agents.remove(id).is_some() {
            debug!(agent = %id, "unregistered agent");
        }
    }

    /// Healthy agents advertising `capability`, ordered by ascending id.
    pub async fn resolve(&self, capability: &str) -> Vec<AgentDescriptor> {
        let agents = self.agents.read().await;
        agents
            .values()
            .filter(|a| a.is_healthy() && a.advertises(capability))
            .cloned()
            .collect()
    }

    /// The union of healthy agents covering the work unit's required
    /// capabilities, deduplicated and ordered by ascending id. Fails with
    /// `UnsatisfiableWorkUnit` naming the first capability no healthy agent
    /// advertises.
    pub async fn resolve_work_unit(
        &self,
        work_unit: &WorkUnit,
    ) -> OrchestratorResult<Vec<AgentDescriptor>> {
        let agents = self.agents.read().await;
        let mut targets: BTreeMap<&str, &AgentDescriptor> = BTreeMap::new();

        for capability in &work_unit.required_capabilities {
            let mut satisfied = false;
            for agent in agents.values() {
                if agent.is_healthy() && agent.advertises(capability) {
                    targets.insert(agent.id.as_str(), agent);
                    satisfied = true;
                }
            }
            if !satisfied {
                return Err(OrchestratorError::UnsatisfiableWorkUnit {
                    work_unit: work_unit.id.clone(),
                    capability: capability.clone(),
                });
            }
        }

        Ok(targets.into_values().cloned().collect())
    }

    /// Update an agent's health status and probe timestamp. The health
    /// monitor is the only caller. Returns false if the id is unknown.
    pub async fn set_status(&self, id: &str, status: HealthState) -> bool {
        let mut agents = self.agents.write().await;
        match agents.get_mut(id) {
            Some(agent) => {
                agent.status = status;
                agent.last_checked = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<AgentDescriptor> {
        self.agents.read().await.get(id).cloned()
    }

    /// All registered agents, ordered by ascending id.
    pub async fn snapshot(&self) -> Vec<AgentDescriptor> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}
