//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.threadkeeper.toml` in repo root
//! 4. `~/.config/threadkeeper/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::constants;
use crate::env::Env;
use crate::recovery::{BatchOptions, BreakerSettings};

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid repository '{0}': expected owner/name")]
    InvalidRepository(String),

    #[error("no repository configured: pass --repo or set GITHUB_REPOSITORY")]
    MissingRepository,

    #[error("no API token configured: set GITHUB_TOKEN or THREADKEEPER_TOKEN")]
    MissingToken,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub pagination: PaginationConfig,
    pub breaker: BreakerConfig,
    pub batch: BatchConfig,
    pub secrets: SecretsConfig,
    pub telemetry: TelemetryConfig,
}

/// Platform endpoints and credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub graphql_url: String,
    pub token: Option<String>,
    /// `owner/name`.
    pub repository: Option<String>,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("graphql_url", &self.graphql_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("repository", &self.repository)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            graphql_url: constants::DEFAULT_GRAPHQL_URL.to_string(),
            token: None,
            repository: None,
        }
    }
}

impl GitHubConfig {
    /// Split `repository` into owner and name.
    pub fn owner_and_repo(&self) -> Result<(String, String), ConfigError> {
        let slug = self
            .repository
            .as_deref()
            .ok_or(ConfigError::MissingRepository)?;
        match slug.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((owner.to_string(), name.to_string()))
            }
            _ => Err(ConfigError::InvalidRepository(slug.to_string())),
        }
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::MissingToken)
    }
}

/// Fetch bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub thread_page_size: u32,
    pub max_threads: usize,
    pub comment_page_size: u32,
    pub max_comments_per_thread: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            thread_page_size: 50,
            max_threads: 500,
            comment_page_size: 100,
            max_comments_per_thread: 200,
        }
    }
}

/// Circuit breaker tuning for the paginated fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub call_timeout_secs: u64,
    pub reset_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        let settings = BreakerSettings::default();
        Self {
            failure_threshold: settings.failure_threshold,
            call_timeout_secs: settings.call_timeout.as_secs(),
            reset_timeout_secs: settings.reset_timeout.as_secs(),
        }
    }
}

impl BreakerConfig {
    pub fn settings(&self) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: self.failure_threshold.max(1),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

/// Thread mutation batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrent: usize,
    pub fail_on_any_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            fail_on_any_error: false,
        }
    }
}

impl BatchConfig {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            max_concurrent: self.max_concurrent.max(1),
            fail_on_any_error: self.fail_on_any_error,
            critical: false,
        }
    }
}

/// Secret redaction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub enabled: bool,
    /// Path to a gitleaks-format rules file, merged with the built-in rules.
    pub additional_rules: Option<String>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            additional_rules: None,
        }
    }
}

/// Diagnostic event forwarding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Collector URL. Events are only logged locally when unset.
    pub endpoint: Option<String>,
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, repo-local config, then applies
    /// environment variable overrides. CLI flags are applied by the caller.
    pub fn load(repo_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: repo-local config
        if let Some(root) = repo_root {
            let local_path = root.join(constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence for non-default values).
    fn merge(&mut self, other: Config) {
        let default_github = GitHubConfig::default();
        if other.github.api_url != default_github.api_url {
            self.github.api_url = other.github.api_url;
        }
        if other.github.graphql_url != default_github.graphql_url {
            self.github.graphql_url = other.github.graphql_url;
        }
        if other.github.token.is_some() {
            self.github.token = other.github.token;
        }
        if other.github.repository.is_some() {
            self.github.repository = other.github.repository;
        }

        let default_pagination = PaginationConfig::default();
        if other.pagination.thread_page_size != default_pagination.thread_page_size {
            self.pagination.thread_page_size = other.pagination.thread_page_size;
        }
        if other.pagination.max_threads != default_pagination.max_threads {
            self.pagination.max_threads = other.pagination.max_threads;
        }
        if other.pagination.comment_page_size != default_pagination.comment_page_size {
            self.pagination.comment_page_size = other.pagination.comment_page_size;
        }
        if other.pagination.max_comments_per_thread != default_pagination.max_comments_per_thread {
            self.pagination.max_comments_per_thread = other.pagination.max_comments_per_thread;
        }

        let default_breaker = BreakerConfig::default();
        if other.breaker.failure_threshold != default_breaker.failure_threshold {
            self.breaker.failure_threshold = other.breaker.failure_threshold;
        }
        if other.breaker.call_timeout_secs != default_breaker.call_timeout_secs {
            self.breaker.call_timeout_secs = other.breaker.call_timeout_secs;
        }
        if other.breaker.reset_timeout_secs != default_breaker.reset_timeout_secs {
            self.breaker.reset_timeout_secs = other.breaker.reset_timeout_secs;
        }

        if other.batch.max_concurrent != BatchConfig::default().max_concurrent {
            self.batch.max_concurrent = other.batch.max_concurrent;
        }
        if other.batch.fail_on_any_error {
            self.batch.fail_on_any_error = true;
        }

        // Disabled overrides enabled
        if !other.secrets.enabled {
            self.secrets.enabled = false;
        }
        if other.secrets.additional_rules.is_some() {
            self.secrets.additional_rules = other.secrets.additional_rules;
        }

        if other.telemetry.endpoint.is_some() {
            self.telemetry.endpoint = other.telemetry.endpoint;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(token) = env.first(&[constants::ENV_TOKEN, constants::ENV_GITHUB_TOKEN]) {
            self.github.token = Some(token);
        }
        if let Some(repository) = env.get(constants::ENV_REPOSITORY) {
            self.github.repository = Some(repository);
        }
        if let Some(url) = env.get(constants::ENV_API_URL) {
            self.github.api_url = url;
        }
        if let Some(url) = env.get(constants::ENV_GRAPHQL_URL) {
            self.github.graphql_url = url;
        }

        if let Some(val) = env.get(constants::ENV_MAX_CONCURRENT) {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.batch.max_concurrent = n,
                _ => tracing::warn!(
                    "ignoring invalid {} value: {val}",
                    constants::ENV_MAX_CONCURRENT
                ),
            }
        }

        match env.flag(constants::ENV_SECRETS) {
            Some(Ok(enabled)) => self.secrets.enabled = enabled,
            Some(Err(raw)) => {
                tracing::warn!("ignoring invalid {} value: {raw}", constants::ENV_SECRETS)
            }
            None => {}
        }

        if let Some(endpoint) = env.get(constants::ENV_TELEMETRY_ENDPOINT) {
            self.telemetry.endpoint = Some(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty_env() -> Env {
        Env::mock(Vec::<(&str, &str)>::new())
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.pagination.thread_page_size, 50);
        assert_eq!(config.pagination.max_threads, 500);
        assert_eq!(config.pagination.comment_page_size, 100);
        assert_eq!(config.pagination.max_comments_per_thread, 200);
        assert_eq!(config.breaker.settings(), BreakerSettings::default());
        assert_eq!(config.batch.max_concurrent, 5);
        assert!(config.secrets.enabled);
        assert_eq!(config.github.api_url, "https://api.github.com");
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[github]
repository = "octo/widgets"

[pagination]
max_threads = 100

[breaker]
failure_threshold = 2
reset_timeout_secs = 10

[batch]
max_concurrent = 2
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));
        assert_eq!(config.pagination.max_threads, 100);
        assert_eq!(config.pagination.thread_page_size, 50);
        assert_eq!(config.breaker.settings().failure_threshold, 2);
        assert_eq!(config.breaker.settings().reset_timeout, Duration::from_secs(10));
        assert_eq!(config.batch.options().max_concurrent, 2);
    }

    #[test]
    fn merge_overrides_non_default_values() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.github.api_url = "https://ghe.example.com/api/v3".to_string();
        other.github.token = Some("ghp_file".to_string());
        other.pagination.comment_page_size = 25;
        other.breaker.call_timeout_secs = 5;
        other.secrets.enabled = false;
        other.telemetry.endpoint = Some("https://collector.example.com".to_string());

        base.merge(other);

        assert_eq!(base.github.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(base.github.token.as_deref(), Some("ghp_file"));
        assert_eq!(base.pagination.comment_page_size, 25);
        assert_eq!(base.breaker.call_timeout_secs, 5);
        assert!(!base.secrets.enabled);
        assert!(base.telemetry.endpoint.is_some());
    }

    #[test]
    fn merge_keeps_base_when_other_is_default() {
        let mut base = Config::default();
        base.github.repository = Some("octo/widgets".to_string());
        base.batch.max_concurrent = 9;
        base.merge(Config::default());
        assert_eq!(base.github.repository.as_deref(), Some("octo/widgets"));
        assert_eq!(base.batch.max_concurrent, 9);
    }

    #[test]
    fn load_file_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{ toml").unwrap();
        let err = Config::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn load_file_not_found() {
        let err = Config::load_file(Path::new("/tmp/threadkeeper_missing_config.toml")).unwrap_err();
        assert!(err.to_string().contains("read"));
    }

    #[test]
    fn load_from_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".threadkeeper.toml"),
            "[pagination]\nmax_threads = 42\n",
        )
        .unwrap();
        let config = Config::load(Some(dir.path()), &empty_env()).unwrap();
        assert_eq!(config.pagination.max_threads, 42);
    }

    #[test]
    fn env_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".threadkeeper.toml"),
            "[github]\nrepository = \"file/repo\"\n",
        )
        .unwrap();
        let env = Env::mock([
            ("GITHUB_REPOSITORY", "env/repo"),
            ("GITHUB_TOKEN", "ghp_env"),
            ("THREADKEEPER_MAX_CONCURRENT", "3"),
            ("THREADKEEPER_SECRETS", "off"),
        ]);
        let config = Config::load(Some(dir.path()), &env).unwrap();
        assert_eq!(config.github.repository.as_deref(), Some("env/repo"));
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
        assert_eq!(config.batch.max_concurrent, 3);
        assert!(!config.secrets.enabled);
    }

    #[test]
    fn threadkeeper_token_wins_over_github_token() {
        let env = Env::mock([("GITHUB_TOKEN", "ghp_a"), ("THREADKEEPER_TOKEN", "ghp_b")]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.github.token.as_deref(), Some("ghp_b"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let env = Env::mock([("THREADKEEPER_MAX_CONCURRENT", "0"), ("THREADKEEPER_SECRETS", "perhaps")]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.batch.max_concurrent, 5);
        assert!(config.secrets.enabled);
    }

    #[test]
    fn owner_and_repo_parsing() {
        let mut github = GitHubConfig::default();
        assert!(matches!(github.owner_and_repo(), Err(ConfigError::MissingRepository)));
        github.repository = Some("octo/widgets".to_string());
        assert_eq!(
            github.owner_and_repo().unwrap(),
            ("octo".to_string(), "widgets".to_string())
        );
        for bad in ["octo", "/widgets", "octo/", "a/b/c"] {
            github.repository = Some(bad.to_string());
            assert!(matches!(github.owner_and_repo(), Err(ConfigError::InvalidRepository(_))));
        }
    }

    #[test]
    fn require_token() {
        let mut github = GitHubConfig::default();
        assert!(matches!(github.require_token(), Err(ConfigError::MissingToken)));
        github.token = Some("ghp_abc".to_string());
        assert_eq!(github.require_token().unwrap(), "ghp_abc");
    }

    #[test]
    fn debug_redacts_token() {
        let github = GitHubConfig {
            token: Some("ghp_supersecret".to_string()),
            ..GitHubConfig::default()
        };
        let debug = format!("{github:?}");
        assert!(!debug.contains("ghp_supersecret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
