use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{ChangeDetail, ChangeStatus, CommitDetail, CommitSummary};

/// GitHub read API client feeding the report workflow. Consumed, not
/// reimplemented: commits in, work unit payloads out.
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    /// Create a new GitHub client with authentication token
    pub fn new(token: String) -> OrchestratorResult<Self> {
        let client = Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(github_err)?;

        Ok(Self { client })
    }

    /// List the most recent commits on the default branch.
    pub async fn list_recent_commits(
        &self,
        repo: &str,
        limit: u8,
    ) -> OrchestratorResult<Vec<CommitSummary>> {
        let (owner, name) = parse_repo(repo)?;
        info!("Fetching {} recent commits from {}", limit, repo);

        let route = format!("/repos/{}/{}/commits?per_page={}", owner, name, limit);
        let commits: Vec<Value> = self
            .client
            .get(route, None::<&()>)
            .await
            .map_err(github_err)?;

        debug!("Fetched {} commits", commits.len());
        Ok(commits.iter().map(commit_summary).collect())
    }

    /// Fetch the changed files of a single commit, including patches.
    pub async fn get_commit_detail(&self, repo: &str, sha: &str) -> OrchestratorResult<CommitDetail> {
        let (owner, name) = parse_repo(repo)?;
        debug!("Fetching commit detail for {}@{}", repo, sha);

        let route = format!("/repos/{}/{}/commits/{}", owner, name, sha);
        let commit: Value = self
            .client
            .get(route, None::<&()>)
            .await
            .map_err(github_err)?;

        let files = commit["files"]
            .as_array()
            .map(|files| files.iter().map(change_detail).collect())
            .unwrap_or_default();

        Ok(CommitDetail {
            sha: commit["sha"].as_str().unwrap_or(sha).to_string(),
            message: commit["commit"]["message"].as_str().unwrap_or_default().to_string(),
            files,
        })
    }

    /// Retrieve the content of a file at an optional ref.
    pub async fn get_file_content(
        &self,
        repo: &str,
        path: &str,
        reference: Option<&str>,
    ) -> OrchestratorResult<String> {
        let (owner, name) = parse_repo(repo)?;

        let repos = self.client.repos(&owner, &name);
        let mut request = repos.get_content().path(path);
        if let Some(reference) = reference {
            request = request.r#ref(reference);
        }

        let contents = request.send().await.map_err(github_err)?;
        let item = contents
            .items
            .into_iter()
            .next()
            .ok_or_else(|| OrchestratorError::Github(format!("no content at '{}'", path)))?;

        item.decoded_content()
            .ok_or_else(|| OrchestratorError::Github(format!("content at '{}' is not text", path)))
    }

    /// Check if the client can authenticate
    pub async fn check_authentication(&self) -> OrchestratorResult<String> {
        let user = self.client.current().user().await.map_err(github_err)?;
        Ok(user.login)
    }
}

fn github_err(e: octocrab::Error) -> OrchestratorError {
    OrchestratorError::Github(e.to_string())
}

/// Parse repository string into owner and name
fn parse_repo(repo: &str) -> OrchestratorResult<(String, String)> {
    let parts: Vec<&str> = repo.split('/').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(OrchestratorError::Github(format!(
            "invalid repository format, expected 'owner/repo', got '{}'",
            repo
        )));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

fn commit_summary(value: &Value) -> CommitSummary {
    CommitSummary {
        sha: value["sha"].as_str().unwrap_or_default().to_string(),
        author: value["commit"]["author"]["name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        date: parse_date(value["commit"]["author"]["date"].as_str()),
        message: value["commit"]["message"].as_str().unwrap_or_default().to_string(),
    }
}

fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn change_detail(value: &Value) -> ChangeDetail {
    let status = match value["status"].as_str().unwrap_or("modified") {
        "added" => ChangeStatus::Added,
        "removed" => ChangeStatus::Deleted,
        "renamed" => ChangeStatus::Renamed,
        _ => ChangeStatus::Modified,
    };

    ChangeDetail {
        filename: value["filename"].as_str().unwrap_or_default().to_string(),
        status,
        additions: value["additions"].as_u64().unwrap_or(0) as u32,
        deletions: value["deletions"].as_u64().unwrap_or(0) as u32,
        patch: value["patch"].as_str().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_repo() {
        let (owner, repo) = parse_repo("owner/repo").unwrap();
        assert_eq!(owner, "owner");
        assert_eq!(repo, "repo");

        assert!(parse_repo("invalid").is_err());
        assert!(parse_repo("too/many/parts").is_err());
        assert!(parse_repo("/repo").is_err());
    }

    #[test]
    fn commit_summary_maps_api_fields() {
        let value = json!({
            "sha": "abc123",
            "commit": {
                "author": {"name": "Dev One", "date": "2024-03-01T12:00:00Z"},
                "message": "Fix widget pagination"
            }
        });

        let summary = commit_summary(&value);
        assert_eq!(summary.sha, "abc123");
        assert_eq!(summary.author, "Dev One");
        assert_eq!(summary.message, "Fix widget pagination");
        assert!(summary.date.is_some());
    }

    #[test]
    fn commit_summary_tolerates_missing_fields() {
        let summary = commit_summary(&json!({"sha": "abc123"}));
        assert_eq!(summary.author, "unknown");
        assert!(summary.date.is_none());
        assert!(summary.message.is_empty());
    }

    #[test]
    fn change_detail_maps_statuses() {
        let value = json!({
            "filename": "src/lib.rs",
            "status": "removed",
            "additions": 0,
            "deletions": 42,
            "patch": "@@ -1,3 +0,0 @@"
        });

        let detail = change_detail(&value);
        assert_eq!(detail.filename, "src/lib.rs");
        assert!(matches!(detail.status, ChangeStatus::Deleted));
        assert_eq!(detail.deletions, 42);
        assert!(detail.patch.is_some());

        let unknown = change_detail(&json!({"filename": "a", "status": "weird"}));
        assert!(matches!(unknown.status, ChangeStatus::Modified));
    }
}
