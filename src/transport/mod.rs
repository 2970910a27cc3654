//! Wire protocol abstraction for reaching worker agents.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TransportError;
use crate::types::{WorkKind, WorkUnit};

/// Request body sent to an agent for one work unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCallRequest {
    pub work_unit_id: String,
    pub kind: WorkKind,
    pub payload: String,
}

impl AgentCallRequest {
    pub fn for_work_unit(work_unit: &WorkUnit) -> Self {
        Self {
            work_unit_id: work_unit.id.clone(),
            kind: work_unit.kind,
            payload: work_unit.payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ok,
    Error,
}

/// Response body returned by an agent. A `status` of `Error` carries the
/// agent's own error payload and is distinct from a transport failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCallResponse {
    pub status: CallStatus,
    pub payload: String,
}

/// The single abstraction point for the wire protocol. Implementations must
/// propagate transport-level errors distinctly from application-level error
/// payloads; the dispatcher guarantees at most one in-flight call per
/// (work unit, agent) by keeping attempts sequential within a task.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        address: &Url,
        request: &AgentCallRequest,
    ) -> Result<AgentCallResponse, TransportError>;

    /// Liveness probe: success means reachable, nothing more.
    async fn probe(&self, address: &Url) -> Result<(), TransportError>;
}
