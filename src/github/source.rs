use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::GitHubClient;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::workflow::WorkSource;
use crate::types::{ChangeDetail, CommitSummary, SessionContext, WorkKind, WorkUnit};

/// Payload handed to the worker agents for one commit.
#[derive(Debug, Serialize)]
struct AnalyzePayload<'a> {
    commit: &'a CommitSummary,
    files: &'a [ChangeDetail],
}

/// Builds one analyze work unit per recent commit of the session's
/// repository.
pub struct GitHubWorkSource {
    client: GitHubClient,
    commit_limit: u8,
    required_capabilities: BTreeSet<String>,
}

impl GitHubWorkSource {
    pub fn new<I, S>(client: GitHubClient, commit_limit: u8, required_capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client,
            commit_limit,
            required_capabilities: required_capabilities.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl WorkSource for GitHubWorkSource {
    async fn collect(&self, session: &SessionContext) -> OrchestratorResult<Vec<WorkUnit>> {
        let commits = self
            .client
            .list_recent_commits(&session.repository, self.commit_limit)
            .await?;

        let mut units = Vec::with_capacity(commits.len());
        for commit in &commits {
            let detail = self
                .client
                .get_commit_detail(&session.repository, &commit.sha)
                .await?;
            debug!(sha = %commit.sha, files = detail.files.len(), "built work unit for commit");

            let payload = serde_json::to_string(&AnalyzePayload {
                commit,
                files: &detail.files,
            })
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))?;

            units.push(WorkUnit::with_id(
                format!("analyze-{}", commit.sha),
                WorkKind::Analyze,
                payload,
                self.required_capabilities.iter().cloned(),
            ));
        }

        Ok(units)
    }
}
