use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::OrchestratorSettings;
use crate::error::OrchestratorResult;
use crate::orchestrator::aggregator;
use crate::orchestrator::events::EventBus;
use crate::registry::AgentRegistry;
use crate::transport::{AgentCallRequest, CallStatus, Transport};
use crate::types::{AgentDescriptor, AgentResult, ConsolidatedReport, ResultStatus, WorkUnit};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub call_timeout: Duration,
    pub batch_deadline: Duration,
    /// Extra attempts allowed per agent on transient transport errors.
    /// Timeouts and application errors are never retried.
    pub max_transient_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            batch_deadline: Duration::from_secs(120),
            max_transient_retries: 1,
        }
    }
}

impl From<&OrchestratorSettings> for DispatcherConfig {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            call_timeout: Duration::from_secs(settings.call_timeout_seconds),
            batch_deadline: Duration::from_secs(settings.batch_deadline_seconds),
            max_transient_retries: settings.max_transient_retries,
        }
    }
}

/// Handle for one in-flight dispatch batch. Feed it to
/// [`aggregator::aggregate`] to obtain the consolidated report.
#[derive(Debug)]
pub struct PendingDispatch {
    pub(crate) work_unit: WorkUnit,
    pub(crate) expected: Vec<String>,
    pub(crate) results: mpsc::Receiver<AgentResult>,
    pub(crate) cancel: CancellationToken,
    pub(crate) deadline: Instant,
}

impl PendingDispatch {
    pub fn work_unit(&self) -> &WorkUnit {
        &self.work_unit
    }

    /// Agent ids expected to report, ascending.
    pub fn expected_agents(&self) -> &[String] {
        &self.expected
    }

    /// Abandon in-flight calls best-effort. No further retries are issued;
    /// agents are never forcibly killed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Fans a work unit out to every resolved agent concurrently and feeds the
/// per-agent results into a channel consumed by the aggregator.
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<AgentRegistry>,
        transport: Arc<dyn Transport>,
        events: Arc<EventBus>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            events,
            config,
        }
    }

    /// Resolve the work unit's target agents and start one call task per
    /// agent. Fails fast with `UnsatisfiableWorkUnit` before issuing any
    /// network call if a required capability has no healthy provider.
    #[instrument(skip(self, work_unit), fields(work_unit = %work_unit.id, kind = %work_unit.kind))]
    pub async fn dispatch(&self, work_unit: WorkUnit) -> OrchestratorResult<PendingDispatch> {
        let targets = self.registry.resolve_work_unit(&work_unit).await?;
        let expected: Vec<String> = targets.iter().map(|a| a.id.clone()).collect();

        info!(agents = targets.len(), "dispatching work unit");
        self.events
            .publish(
                "dispatcher",
                "dispatch_started",
                json!({
                    "work_unit": work_unit.id,
                    "kind": work_unit.kind,
                    "agents": expected,
                }),
            )
            .await;

        let request = AgentCallRequest::for_work_unit(&work_unit);
        let (tx, rx) = mpsc::channel(targets.len().max(1));
        let cancel = CancellationToken::new();

        for agent in targets {
            tokio::spawn(call_agent(
                Arc::clone(&self.transport),
                agent,
                request.clone(),
                self.config,
                cancel.child_token(),
                tx.clone(),
                Arc::clone(&self.events),
            ));
        }

        Ok(PendingDispatch {
            work_unit,
            expected,
            results: rx,
            cancel,
            deadline: Instant::now() + self.config.batch_deadline,
        })
    }

    /// Dispatch a work unit and wait for its consolidated report.
    pub async fn dispatch_and_aggregate(
        &self,
        work_unit: WorkUnit,
    ) -> OrchestratorResult<ConsolidatedReport> {
        let pending = self.dispatch(work_unit).await?;
        Ok(aggregator::aggregate(pending).await)
    }
}

/// One call task per (work unit, agent). Attempts are strictly sequential,
/// so at most one call per pair is ever in flight.
async fn call_agent(
    transport: Arc<dyn Transport>,
    agent: AgentDescriptor,
    request: AgentCallRequest,
    config: DispatcherConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<AgentResult>,
    events: Arc<EventBus>,
) {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    let (status, payload) = loop {
        attempts += 1;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(agent = %agent.id, "call abandoned by cancellation");
                return;
            }
            outcome = timeout(config.call_timeout, transport.call(&agent.address, &request)) => outcome,
        };

        match outcome {
            Err(_) => {
                warn!(agent = %agent.id, timeout = ?config.call_timeout, "agent call timed out");
                break (ResultStatus::Timeout, String::new());
            }
            Ok(Ok(response)) => match response.status {
                CallStatus::Ok => break (ResultStatus::Ok, response.payload),
                // The agent's own error payload passes through verbatim.
                CallStatus::Error => break (ResultStatus::Error, response.payload),
            },
            Ok(Err(err)) if err.is_transient() && attempts <= config.max_transient_retries => {
                warn!(agent = %agent.id, attempt = attempts, error = %err, "transient transport error, retrying");
                continue;
            }
            Ok(Err(err)) => {
                warn!(agent = %agent.id, attempts, error = %err, "agent call failed");
                break (ResultStatus::Error, err.to_string());
            }
        }
    };

    let result = AgentResult {
        work_unit_id: request.work_unit_id.clone(),
        agent_id: agent.id.clone(),
        status,
        payload,
        latency_ms: started.elapsed().as_millis() as u64,
        attempts,
    };

    events
        .publish(
            "dispatcher",
            "agent_call_completed",
            json!({
                "work_unit": result.work_unit_id,
                "agent": result.agent_id,
                "status": result.status,
                "attempts": result.attempts,
                "latency_ms": result.latency_ms,
            }),
        )
        .await;

    // The receiver may already be gone if the batch was finalized early.
    let _ = tx.send(result).await;
}
