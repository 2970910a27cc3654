//! Recurring liveness probes and the per-agent health state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HealthSettings;
use crate::orchestrator::events::EventBus;
use crate::registry::AgentRegistry;
use crate::transport::Transport;
use crate::types::{AgentDescriptor, HealthState};

#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    pub probe_interval: Duration,
    /// Consecutive failures before an agent flips to unhealthy.
    pub failure_threshold: u32,
    pub probe_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(15),
            failure_threshold: 3,
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&HealthSettings> for HealthMonitorConfig {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            probe_interval: Duration::from_secs(settings.probe_interval_seconds),
            failure_threshold: settings.failure_threshold,
            probe_timeout: Duration::from_secs(settings.probe_timeout_seconds),
        }
    }
}

/// Outcome of probing one agent once.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub agent_id: String,
    pub address: url::Url,
    pub reachable: bool,
    pub status: HealthState,
    pub detail: Option<String>,
}

/// Probes every registered agent on a fixed interval and maintains the
/// per-agent two-state machine: `failure_threshold` consecutive failures
/// flip an agent to unhealthy, a single success flips it back to healthy.
/// The monitor is the only writer of agent status; the dispatcher only
/// reads it.
pub struct HealthMonitor {
    registry: Arc<AgentRegistry>,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    config: HealthMonitorConfig,
    consecutive_failures: Mutex<HashMap<String, u32>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        transport: Arc<dyn Transport>,
        events: Arc<EventBus>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            events,
            config,
            consecutive_failures: Mutex::new(HashMap::new()),
        }
    }

    /// One probing pass over every registered agent, applying state
    /// transitions. Probes run concurrently; outcomes come back in
    /// registry order.
    pub async fn probe_once(&self) -> Vec<ProbeOutcome> {
        let agents = self.registry.snapshot().await;

        let probes = agents.iter().map(|agent| {
            let transport = Arc::clone(&self.transport);
            let address = agent.address.clone();
            let probe_timeout = self.config.probe_timeout;
            async move {
                match timeout(probe_timeout, transport.probe(&address)).await {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(err.to_string()),
                    Err(_) => Some(format!("probe timed out after {:?}", probe_timeout)),
                }
            }
        });

        let failures: Vec<Option<String>> = join_all(probes).await;

        let mut outcomes = Vec::with_capacity(agents.len());
        for (agent, failure) in agents.into_iter().zip(failures) {
            let outcome = self.apply_probe_result(&agent, failure).await;
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn apply_probe_result(
        &self,
        agent: &AgentDescriptor,
        failure: Option<String>,
    ) -> ProbeOutcome {
        let new_status = match &failure {
            None => {
                self.consecutive_failures.lock().await.remove(&agent.id);
                HealthState::Healthy
            }
            Some(detail) => {
                let mut failures = self.consecutive_failures.lock().await;
                let count = failures.entry(agent.id.clone()).or_insert(0);
                *count += 1;
                debug!(agent = %agent.id, consecutive = *count, %detail, "probe failed");

                if *count >= self.config.failure_threshold {
                    HealthState::Unhealthy
                } else {
                    // Below threshold: keep the current status.
                    agent.status
                }
            }
        };

        if new_status != agent.status {
            info!(agent = %agent.id, from = ?agent.status, to = ?new_status, "agent health transition");
            self.events
                .publish(
                    "health",
                    "agent_status_changed",
                    json!({
                        "agent": agent.id,
                        "from": agent.status,
                        "to": new_status,
                    }),
                )
                .await;
        }
        self.registry.set_status(&agent.id, new_status).await;

        ProbeOutcome {
            agent_id: agent.id.clone(),
            address: agent.address.clone(),
            reachable: failure.is_none(),
            status: new_status,
            detail: failure,
        }
    }

    /// Start the recurring probe loop on its own schedule, decoupled from
    /// any dispatch. The first pass runs immediately.
    pub fn spawn(self: Arc<Self>) -> HealthMonitorHandle {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.probe_interval);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => {
                        debug!("health monitor shutting down");
                        return;
                    }
                    _ = interval.tick() => {
                        let outcomes = self.probe_once().await;
                        let down = outcomes.iter().filter(|o| !o.reachable).count();
                        if down > 0 {
                            warn!(down, total = outcomes.len(), "probe pass found unreachable agents");
                        }
                    }
                }
            }
        });

        HealthMonitorHandle { cancel, task }
    }
}

/// Handle to a running health monitor loop.
pub struct HealthMonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthMonitorHandle {
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
