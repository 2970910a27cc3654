//! Streaming merge of per-agent results into a consolidated report.

use chrono::Utc;
use tracing::{debug, warn};

use crate::orchestrator::dispatcher::PendingDispatch;
use crate::types::{AgentResult, Completeness, ConsolidatedReport, ResultStatus};

/// Consume results as they arrive and finalize once every expected agent
/// has reported or the batch deadline elapses, whichever comes first. On
/// deadline, remaining in-flight calls are abandoned via cancellation.
pub async fn aggregate(mut pending: PendingDispatch) -> ConsolidatedReport {
    let mut results: Vec<AgentResult> = Vec::with_capacity(pending.expected.len());
    let deadline = tokio::time::sleep_until(pending.deadline);
    tokio::pin!(deadline);

    while results.len() < pending.expected.len() {
        tokio::select! {
            maybe = pending.results.recv() => match maybe {
                Some(result) => {
                    debug!(agent = %result.agent_id, status = ?result.status, "result received");
                    results.push(result);
                }
                // Every sender is gone; nothing more will arrive.
                None => break,
            },
            _ = &mut deadline => {
                warn!(
                    work_unit = %pending.work_unit.id,
                    received = results.len(),
                    expected = pending.expected.len(),
                    "batch deadline elapsed, abandoning remaining calls"
                );
                pending.cancel.cancel();
                break;
            }
        }
    }

    finalize(&pending.work_unit.id, &pending.expected, results)
}

/// Sort results by ascending agent id and compute completeness: partial iff
/// an expected result is missing or any result failed. Error and timeout
/// results are retained so callers can see which capability failed.
pub(crate) fn finalize(
    work_unit_id: &str,
    expected: &[String],
    mut results: Vec<AgentResult>,
) -> ConsolidatedReport {
    results.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let missing = results.len() < expected.len();
    let degraded = results.iter().any(|r| r.status != ResultStatus::Ok);
    let completeness = if missing || degraded {
        Completeness::Partial
    } else {
        Completeness::Full
    };

    ConsolidatedReport {
        work_unit_id: work_unit_id.to_string(),
        results,
        completeness,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::types::{WorkKind, WorkUnit};

    fn result(agent_id: &str, status: ResultStatus) -> AgentResult {
        AgentResult {
            work_unit_id: "wu-1".to_string(),
            agent_id: agent_id.to_string(),
            status,
            payload: String::new(),
            latency_ms: 10,
            attempts: 1,
        }
    }

    fn pending(
        expected: &[&str],
        deadline: Duration,
    ) -> (PendingDispatch, mpsc::Sender<AgentResult>, CancellationToken) {
        let (tx, rx) = mpsc::channel(expected.len().max(1));
        let cancel = CancellationToken::new();
        let pending = PendingDispatch {
            work_unit: WorkUnit::with_id("wu-1", WorkKind::Analyze, "{}", ["review-quality"]),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            results: rx,
            cancel: cancel.clone(),
            deadline: Instant::now() + deadline,
        };
        (pending, tx, cancel)
    }

    #[tokio::test]
    async fn report_is_ordered_by_agent_id_regardless_of_arrival() {
        let (pending, tx, _cancel) = pending(&["agent-a", "agent-b", "agent-c"], Duration::from_secs(10));

        for id in ["agent-c", "agent-a", "agent-b"] {
            tx.send(result(id, ResultStatus::Ok)).await.unwrap();
        }
        drop(tx);

        let report = aggregate(pending).await;
        let ids: Vec<_> = report.results.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["agent-a", "agent-b", "agent-c"]);
        assert_eq!(report.completeness, Completeness::Full);
    }

    #[tokio::test]
    async fn finalizes_early_once_all_expected_have_reported() {
        // Deadline far in the future: completion must come from the results.
        let (pending, tx, _cancel) = pending(&["agent-a", "agent-b"], Duration::from_secs(3600));

        tx.send(result("agent-b", ResultStatus::Ok)).await.unwrap();
        tx.send(result("agent-a", ResultStatus::Ok)).await.unwrap();
        // Sender stays alive; early finalization must not wait for it.

        let report = aggregate(pending).await;
        assert_eq!(report.results.len(), 2);
        drop(tx);
    }

    #[tokio::test]
    async fn error_and_timeout_results_are_retained() {
        let (pending, tx, _cancel) = pending(&["agent-a", "agent-b", "agent-c"], Duration::from_secs(10));

        tx.send(result("agent-a", ResultStatus::Ok)).await.unwrap();
        tx.send(result("agent-b", ResultStatus::Timeout)).await.unwrap();
        tx.send(result("agent-c", ResultStatus::Error)).await.unwrap();
        drop(tx);

        let report = aggregate(pending).await;
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.completeness, Completeness::Partial);
        assert_eq!(report.failed_agents(), vec!["agent-b", "agent-c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_finalizes_partial_and_cancels_stragglers() {
        let (pending, tx, cancel) = pending(&["agent-a", "agent-b"], Duration::from_secs(1));

        tx.send(result("agent-a", ResultStatus::Ok)).await.unwrap();
        // agent-b never reports; keep the sender alive so only the deadline
        // can end the wait.

        let report = aggregate(pending).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.completeness, Completeness::Partial);
        assert!(cancel.is_cancelled());
        drop(tx);
    }

    #[tokio::test]
    async fn cancelled_batch_finalizes_with_what_arrived() {
        let (pending, tx, _cancel) = pending(&["agent-a", "agent-b"], Duration::from_secs(10));

        tx.send(result("agent-a", ResultStatus::Ok)).await.unwrap();
        pending.cancel();
        drop(tx); // cancelled tasks drop their senders without reporting

        let report = aggregate(pending).await;
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.completeness, Completeness::Partial);
    }

    #[test]
    fn missing_result_alone_makes_report_partial() {
        let expected = vec!["agent-a".to_string(), "agent-b".to_string()];
        let report = finalize("wu-1", &expected, vec![result("agent-a", ResultStatus::Ok)]);
        assert_eq!(report.completeness, Completeness::Partial);

        let report = finalize(
            "wu-1",
            &expected,
            vec![
                result("agent-a", ResultStatus::Ok),
                result("agent-b", ResultStatus::Ok),
            ],
        );
        assert_eq!(report.completeness, Completeness::Full);
    }
}
