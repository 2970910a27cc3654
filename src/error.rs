//! Error types for the orchestrator.

use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors that abort an operation outright. Per-agent failures during a
/// dispatch are not errors at this level; they surface inside the
/// [`AgentResult`](crate::types::AgentResult) for that agent.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("duplicate agent id: {0}")]
    DuplicateId(String),

    #[error("no healthy agent advertises capability '{capability}' required by work unit {work_unit}")]
    UnsatisfiableWorkUnit { work_unit: String, capability: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("GitHub API error: {0}")]
    Github(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Transport-level failures, distinct from application-level error payloads
/// returned by an agent. Transient variants are eligible for the
/// dispatcher's single retry.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("agent returned server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("agent rejected request: HTTP {status}")]
    Rejected { status: u16 },

    #[error("malformed agent response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Connection failures and 5xx responses are worth one more attempt;
    /// anything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::ServerError { .. }
        )
    }
}
