//! Configuration management

use crate::dataset::DatasetKind;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dataset variant the service runs against
    #[serde(default = "default_dataset")]
    pub dataset: DatasetKind,

    /// SQLite database holding the dataset table
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// CSV the database is rebuilt from on refresh
    #[serde(default)]
    pub source_csv: Option<PathBuf>,

    /// Query cache lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Page size used when the request does not ask for one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Background refresh period, disabled when absent
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,

    /// LLM service configuration
    #[serde(default)]
    pub llm_service: LLMServiceConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            database_path: default_database_path(),
            source_csv: None,
            cache_ttl_secs: default_cache_ttl(),
            default_page_size: default_page_size(),
            refresh_interval_secs: None,
            llm_service: LLMServiceConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

fn default_dataset() -> DatasetKind {
    std::env::var("DATASIFT_DATASET")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn default_database_path() -> PathBuf {
    std::env::var("DATASIFT_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::DATA_DIR_NAME)
                .join("dataset.sqlite")
        })
}

fn default_cache_ttl() -> u64 {
    std::env::var("DATASIFT_CACHE_TTL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}

fn default_page_size() -> usize {
    20
}

/// LLM service configuration for query extraction and the agent planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of an OpenAI-compatible service; extraction falls back to
    /// the heuristic when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// API key (optional, for authenticated services). `DATASIFT_LLM_API_KEY`
    /// is read at request time and never written to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl LLMServiceConfig {
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Key from the config file, else from the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("DATASIFT_LLM_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATASIFT_LLM_URL").ok(),
            model: default_chat_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("DATASIFT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string())
}

fn default_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_max_iterations() -> usize {
    std::env::var("DATASIFT_AGENT_MAX_ITERATIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(10)
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from a specific file, falling back to defaults when absent
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            tracing::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        std::fs::write(
            &path,
            "dataset: reviews\ndatabase_path: /tmp/reviews.sqlite\nllm_service:\n  url: http://localhost:8000\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.dataset, DatasetKind::Reviews);
        assert_eq!(config.database_path, PathBuf::from("/tmp/reviews.sqlite"));
        assert!(config.llm_service.is_configured());
        assert_eq!(config.default_page_size, 20);
        assert!(config.agent.max_iterations > 0);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_from(&temp.path().join("absent.yml")).unwrap();
        assert_eq!(config.default_page_size, 20);
    }

    #[test]
    fn test_saved_config_has_no_env_api_key() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.yml");

        let config = Config::default();
        assert!(config.llm_service.api_key.is_none());
        config.save_to(&path).unwrap();
        let yaml = std::fs::read_to_string(&path).unwrap();
        assert!(!yaml.contains("api_key"));

        let explicit = LLMServiceConfig {
            api_key: Some("from-file".to_string()),
            ..LLMServiceConfig::default()
        };
        assert_eq!(explicit.resolved_api_key().as_deref(), Some("from-file"));
    }

    #[test]
    fn test_blank_url_is_not_configured() {
        let llm = LLMServiceConfig {
            url: Some("  ".to_string()),
            ..LLMServiceConfig::default()
        };
        assert!(!llm.is_configured());
    }
}
