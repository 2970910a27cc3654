use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;
use uuid::Uuid;

/// Core types for the commit review orchestrator

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Unhealthy,
}

/// A registered worker agent. `status` and `last_checked` are written only
/// by the health monitor; everything else is fixed at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub address: Url,
    pub capabilities: BTreeSet<String>,
    pub status: HealthState,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    Fetch,
    Analyze,
    Review,
}

/// One logical task submitted for dispatch. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: String,
    pub kind: WorkKind,
    pub payload: String,
    pub required_capabilities: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
    Timeout,
}

/// Outcome of one (work unit, agent) call. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub work_unit_id: String,
    pub agent_id: String,
    pub status: ResultStatus,
    pub payload: String,
    pub latency_ms: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    Full,
    Partial,
}

/// The merged, partial-failure-tolerant result of one dispatch cycle.
/// Results are ordered by ascending agent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    pub work_unit_id: String,
    pub results: Vec<AgentResult>,
    pub completeness: Completeness,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Per-run session context, owned by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub repository: String,
    pub requested_by: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Everything a single workflow run produced: one consolidated report per
/// submitted work unit, in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub session: SessionContext,
    pub reports: Vec<ConsolidatedReport>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDetail {
    pub filename: String,
    pub status: ChangeStatus,
    pub additions: u32,
    pub deletions: u32,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    pub message: String,
    pub files: Vec<ChangeDetail>,
}

impl Default for HealthState {
    fn default() -> Self {
        HealthState::Unknown
    }
}

impl AgentDescriptor {
    pub fn new<I, S>(id: impl Into<String>, address: Url, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            address,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            status: HealthState::Unknown,
            last_checked: None,
        }
    }

    pub fn advertises(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Fetch => "fetch",
            WorkKind::Analyze => "analyze",
            WorkKind::Review => "review",
        }
    }
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fetch" => Ok(WorkKind::Fetch),
            "analyze" => Ok(WorkKind::Analyze),
            "review" => Ok(WorkKind::Review),
            other => Err(format!("unknown work kind: {}", other)),
        }
    }
}

impl WorkUnit {
    pub fn new<I, S>(kind: WorkKind, payload: impl Into<String>, required_capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_id(Uuid::new_v4().to_string(), kind, payload, required_capabilities)
    }

    pub fn with_id<I, S>(
        id: impl Into<String>,
        kind: WorkKind,
        payload: impl Into<String>,
        required_capabilities: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            kind,
            payload: payload.into(),
            required_capabilities: required_capabilities.into_iter().map(Into::into).collect(),
        }
    }
}

impl AgentResult {
    pub fn succeeded(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}

impl ConsolidatedReport {
    pub fn is_partial(&self) -> bool {
        self.completeness == Completeness::Partial
    }

    pub fn result_for(&self, agent_id: &str) -> Option<&AgentResult> {
        self.results.iter().find(|r| r.agent_id == agent_id)
    }

    /// Agents whose result carries an error or timeout status.
    pub fn failed_agents(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.agent_id.as_str())
            .collect()
    }
}

impl SessionContext {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            repository: repository.into(),
            requested_by: None,
            started_at: Utc::now(),
        }
    }
}

impl RunSummary {
    pub fn new(session: SessionContext, reports: Vec<ConsolidatedReport>) -> Self {
        Self {
            session,
            reports,
            generated_at: Utc::now(),
        }
    }

    pub fn partial_count(&self) -> usize {
        self.reports.iter().filter(|r| r.is_partial()).count()
    }

    pub fn total_results(&self) -> usize {
        self.reports.iter().map(|r| r.results.len()).sum()
    }
}
