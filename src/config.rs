/// Configuration management for the commit review orchestrator
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::AgentDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub orchestrator: OrchestratorSettings,
    pub health: HealthSettings,
    pub agents: Vec<AgentEntry>,
    pub github: GitHubSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Per-call timeout for a single agent request.
    pub call_timeout_seconds: u64,
    /// Overall deadline for one dispatch batch.
    pub batch_deadline_seconds: u64,
    /// Extra attempts allowed per agent on transient transport errors.
    pub max_transient_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    pub probe_interval_seconds: u64,
    /// Consecutive probe failures before an agent is marked unhealthy.
    pub failure_threshold: u32,
    pub probe_timeout_seconds: u64,
    /// Liveness endpoint path, relative to each agent's address.
    pub probe_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub address: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    /// Repository slug, `owner/repo`. The token always comes from the
    /// GITHUB_TOKEN environment variable.
    pub repository: String,
    /// Default number of commits per status report run.
    pub commit_limit: u8,
    /// Capabilities every analyze work unit requires.
    pub required_capabilities: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorSettings {
                call_timeout_seconds: 30,
                batch_deadline_seconds: 120,
                max_transient_retries: 1,
            },
            health: HealthSettings {
                probe_interval_seconds: 15,
                failure_threshold: 3,
                probe_timeout_seconds: 3,
                probe_path: "/.well-known/agent-card.json".to_string(),
            },
            agents: vec![
                AgentEntry {
                    id: "repo-agent".to_string(),
                    address: "http://127.0.0.1:8001".to_string(),
                    capabilities: vec!["fetch-commits".to_string(), "fetch-files".to_string()],
                },
                AgentEntry {
                    id: "security-agent".to_string(),
                    address: "http://127.0.0.1:8002".to_string(),
                    capabilities: vec!["scan-security".to_string()],
                },
                AgentEntry {
                    id: "reviewer-agent".to_string(),
                    address: "http://127.0.0.1:8003".to_string(),
                    capabilities: vec!["review-quality".to_string()],
                },
            ],
            github: GitHubSettings {
                repository: String::new(),
                commit_limit: 5,
                required_capabilities: vec![
                    "scan-security".to_string(),
                    "review-quality".to_string(),
                ],
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> OrchestratorResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> OrchestratorResult<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Override settings from environment variables where present.
    pub fn apply_env_overrides(&mut self) -> OrchestratorResult<()> {
        if let Ok(timeout) = std::env::var("REVIEW_ORCH_CALL_TIMEOUT_SECONDS") {
            self.orchestrator.call_timeout_seconds = timeout
                .parse()
                .map_err(|_| OrchestratorError::Config("REVIEW_ORCH_CALL_TIMEOUT_SECONDS must be an integer".to_string()))?;
        }

        if let Ok(deadline) = std::env::var("REVIEW_ORCH_BATCH_DEADLINE_SECONDS") {
            self.orchestrator.batch_deadline_seconds = deadline
                .parse()
                .map_err(|_| OrchestratorError::Config("REVIEW_ORCH_BATCH_DEADLINE_SECONDS must be an integer".to_string()))?;
        }

        if let Ok(interval) = std::env::var("REVIEW_ORCH_PROBE_INTERVAL_SECONDS") {
            self.health.probe_interval_seconds = interval
                .parse()
                .map_err(|_| OrchestratorError::Config("REVIEW_ORCH_PROBE_INTERVAL_SECONDS must be an integer".to_string()))?;
        }

        if let Ok(repository) = std::env::var("GITHUB_REPO") {
            self.github.repository = repository;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.orchestrator.call_timeout_seconds == 0 {
            return Err(OrchestratorError::Config(
                "call timeout must be greater than 0".to_string(),
            ));
        }

        if self.orchestrator.batch_deadline_seconds < self.orchestrator.call_timeout_seconds {
            return Err(OrchestratorError::Config(
                "batch deadline must not be shorter than the per-call timeout".to_string(),
            ));
        }

        if self.health.failure_threshold == 0 {
            return Err(OrchestratorError::Config(
                "health failure threshold must be at least 1".to_string(),
            ));
        }

        if !self.health.probe_path.starts_with('/') {
            return Err(OrchestratorError::Config(
                "health probe path must start with '/'".to_string(),
            ));
        }

        if self.github.required_capabilities.is_empty() {
            return Err(OrchestratorError::Config(
                "github.required_capabilities must not be empty".to_string(),
            ));
        }

        for entry in &self.agents {
            if entry.capabilities.is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "agent '{}' declares no capabilities",
                    entry.id
                )));
            }
            entry.parse_address()?;
        }

        Ok(())
    }
}

impl AgentEntry {
    fn parse_address(&self) -> OrchestratorResult<Url> {
        Url::parse(&self.address).map_err(|e| {
            OrchestratorError::Config(format!("agent '{}' has invalid address: {}", self.id, e))
        })
    }

    /// Convert this entry into a registrable descriptor (status unknown).
    pub fn to_descriptor(&self) -> OrchestratorResult<AgentDescriptor> {
        let address = self.parse_address()?;
        Ok(AgentDescriptor::new(
            self.id.clone(),
            address,
            self.capabilities.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_config_save_and_load() {
        let config = Config::default();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).await.unwrap();
        let loaded = Config::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(
            config.orchestrator.call_timeout_seconds,
            loaded.orchestrator.call_timeout_seconds
        );
        assert_eq!(config.agents.len(), loaded.agents.len());
        assert_eq!(config.health.probe_path, loaded.health.probe_path);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.orchestrator.call_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.orchestrator.batch_deadline_seconds = 1;
        assert!(config.validate().is_err());

        config = Config::default();
        config.agents[0].address = "not a url".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.agents[0].capabilities.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_fleet_converts_to_descriptors() {
        let config = Config::default();
        let descriptors: Vec<_> = config
            .agents
            .iter()
            .map(|entry| entry.to_descriptor().unwrap())
            .collect();

        assert_eq!(descriptors.len(), 3);
        assert!(descriptors[0].advertises("fetch-commits"));
        assert!(descriptors[1].advertises("scan-security"));
        assert_eq!(descriptors[2].address.port(), Some(8003));
    }
}
