//! The status report run as an explicit finite-state workflow.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument};

use crate::error::OrchestratorResult;
use crate::orchestrator::aggregator;
use crate::orchestrator::dispatcher::{Dispatcher, PendingDispatch};
use crate::orchestrator::events::EventBus;
use crate::types::{ConsolidatedReport, RunSummary, SessionContext, WorkUnit};

/// Produces the work units for a run. The GitHub-backed implementation
/// builds one analyze unit per recent commit; tests substitute their own.
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn collect(&self, session: &SessionContext) -> OrchestratorResult<Vec<WorkUnit>>;
}

/// Workflow stages, stepped in order by the driver loop. Each stage owns
/// the data the next one needs.
pub enum WorkflowState {
    CollectRequirements,
    Dispatch { work_units: Vec<WorkUnit> },
    Aggregate { dispatched: Vec<PendingDispatch> },
    Report { reports: Vec<ConsolidatedReport> },
}

impl WorkflowState {
    fn stage_name(&self) -> &'static str {
        match self {
            WorkflowState::CollectRequirements => "collect_requirements",
            WorkflowState::Dispatch { .. } => "dispatch",
            WorkflowState::Aggregate { .. } => "aggregate",
            WorkflowState::Report { .. } => "report",
        }
    }
}

/// Drives one session through collect -> dispatch -> aggregate -> report.
/// The session context is owned by the caller; the workflow holds no state
/// across runs.
pub struct ReportWorkflow {
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn WorkSource>,
    events: Arc<EventBus>,
}

impl ReportWorkflow {
    pub fn new(dispatcher: Arc<Dispatcher>, source: Arc<dyn WorkSource>, events: Arc<EventBus>) -> Self {
        Self {
            dispatcher,
            source,
            events,
        }
    }

    #[instrument(skip(self, session), fields(session = %session.session_id, repository = %session.repository))]
    pub async fn run(&self, session: &SessionContext) -> OrchestratorResult<RunSummary> {
        let mut state = WorkflowState::CollectRequirements;

        loop {
            info!(stage = state.stage_name(), "entering workflow stage");

            state = match state {
                WorkflowState::CollectRequirements => {
                    let work_units = self.source.collect(session).await?;
                    info!(units = work_units.len(), "requirements collected");
                    WorkflowState::Dispatch { work_units }
                }

                WorkflowState::Dispatch { work_units } => {
                    let mut dispatched = Vec::with_capacity(work_units.len());
                    for unit in work_units {
                        dispatched.push(self.dispatcher.dispatch(unit).await?);
                    }
                    WorkflowState::Aggregate { dispatched }
                }

                WorkflowState::Aggregate { dispatched } => {
                    let mut reports = Vec::with_capacity(dispatched.len());
                    for pending in dispatched {
                        let report = aggregator::aggregate(pending).await;
                        self.events
                            .publish(
                                "workflow",
                                "report_finalized",
                                json!({
                                    "work_unit": report.work_unit_id,
                                    "completeness": report.completeness,
                                }),
                            )
                            .await;
                        reports.push(report);
                    }
                    WorkflowState::Report { reports }
                }

                WorkflowState::Report { reports } => {
                    let summary = RunSummary::new(session.clone(), reports);
                    self.events
                        .publish(
                            "workflow",
                            "run_completed",
                            json!({
                                "session": summary.session.session_id,
                                "reports": summary.reports.len(),
                                "partial": summary.partial_count(),
                            }),
                        )
                        .await;
                    return Ok(summary);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::OrchestratorError;
    use crate::orchestrator::dispatcher::DispatcherConfig;
    use crate::registry::AgentRegistry;
    use crate::transport::fake::{FakeOutcome, FakeTransport};
    use crate::types::{AgentDescriptor, HealthState, WorkKind};
    use url::Url;

    struct StaticSource {
        units: Vec<WorkUnit>,
    }

    #[async_trait]
    impl WorkSource for StaticSource {
        async fn collect(&self, _session: &SessionContext) -> OrchestratorResult<Vec<WorkUnit>> {
            Ok(self.units.clone())
        }
    }

    async fn workflow_with(
        transport: Arc<FakeTransport>,
        units: Vec<WorkUnit>,
    ) -> (ReportWorkflow, Arc<EventBus>) {
        let registry = Arc::new(AgentRegistry::new());
        for (id, port, capability) in [
            ("security-agent", 8002, "scan-security"),
            ("reviewer-agent", 8003, "review-quality"),
        ] {
            registry
                .register(AgentDescriptor::new(
                    id,
                    Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap(),
                    [capability],
                ))
                .await
                .unwrap();
            registry.set_status(id, HealthState::Healthy).await;
        }

        let events = Arc::new(EventBus::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            transport,
            Arc::clone(&events),
            DispatcherConfig {
                call_timeout: Duration::from_secs(5),
                batch_deadline: Duration::from_secs(30),
                max_transient_retries: 1,
            },
        ));
        let workflow = ReportWorkflow::new(
            dispatcher,
            Arc::new(StaticSource { units }),
            Arc::clone(&events),
        );
        (workflow, events)
    }

    fn analyze_unit(id: &str) -> WorkUnit {
        WorkUnit::with_id(id, WorkKind::Analyze, "{}", ["scan-security", "review-quality"])
    }

    #[tokio::test]
    async fn run_produces_one_report_per_unit_in_submission_order() {
        let transport = Arc::new(FakeTransport::new());
        let (workflow, events) = workflow_with(
            Arc::clone(&transport),
            vec![analyze_unit("commit-aaa"), analyze_unit("commit-bbb")],
        )
        .await;

        let session = SessionContext::new("octo/widgets");
        let summary = workflow.run(&session).await.unwrap();

        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.reports[0].work_unit_id, "commit-aaa");
        assert_eq!(summary.reports[1].work_unit_id, "commit-bbb");
        assert_eq!(summary.partial_count(), 0);
        assert_eq!(summary.total_results(), 4);

        let completed = events.history(Some("workflow"), Some("run_completed"), None).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].data["reports"], 2);
    }

    #[tokio::test]
    async fn degraded_agent_yields_partial_report_but_run_succeeds() {
        let transport = Arc::new(FakeTransport::new());
        transport.script_calls(
            8002,
            vec![FakeOutcome::ConnectionError, FakeOutcome::ConnectionError],
        );
        let (workflow, _events) =
            workflow_with(Arc::clone(&transport), vec![analyze_unit("commit-aaa")]).await;

        let session = SessionContext::new("octo/widgets");
        let summary = workflow.run(&session).await.unwrap();

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.partial_count(), 1);
        assert_eq!(summary.reports[0].failed_agents(), vec!["security-agent"]);
    }

    #[tokio::test]
    async fn uncovered_capability_aborts_the_run() {
        let transport = Arc::new(FakeTransport::new());
        let unit = WorkUnit::with_id("commit-aaa", WorkKind::Analyze, "{}", ["deploy"]);
        let (workflow, _events) = workflow_with(Arc::clone(&transport), vec![unit]).await;

        let session = SessionContext::new("octo/widgets");
        let err = workflow.run(&session).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::UnsatisfiableWorkUnit { capability, .. } if capability == "deploy"
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_source_yields_empty_summary() {
        let transport = Arc::new(FakeTransport::new());
        let (workflow, _events) = workflow_with(Arc::clone(&transport), vec![]).await;

        let session = SessionContext::new("octo/widgets");
        let summary = workflow.run(&session).await.unwrap();
        assert!(summary.reports.is_empty());
        assert_eq!(transport.call_count(), 0);
    }
}
