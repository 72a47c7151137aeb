//! Pipeline configuration
//!
//! Loaded in three layers: serde defaults, an optional YAML file, then
//! environment variables. `validate()` runs last and rejects settings the
//! pipeline cannot run with.

use crate::fanout::Throttle;
use crate::keys::ResultLayout;
use crate::reassemble::PollConfig;
use crate::scrape::DEFAULT_ARXIV_SEARCH_URL;
use crate::summarize::DEFAULT_MODEL;
use crate::worker::WorkerBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; the binary picks a per-user default when unset
    pub db_path: Option<PathBuf>,
    pub result_prefix: String,
    pub scraper_prefix: String,
    pub library_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            result_prefix: "ai-research-pipeline/output/summarizer/".to_string(),
            scraper_prefix: "ai-research-pipeline/output/scraper/".to_string(),
            library_key: "article_library.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub url: String,
    pub limit: usize,
    /// Results to skip at the top of the page
    pub start: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ARXIV_SEARCH_URL.to_string(),
            limit: 8,
            start: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub chunk_size: usize,
    pub worker_function: String,
    pub throttle_base_ms: u64,
    pub throttle_jitter_min_ms: u64,
    pub throttle_jitter_max_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2,
            worker_function: "ai-research-summarizer".to_string(),
            throttle_base_ms: 3000,
            throttle_jitter_min_ms: 500,
            throttle_jitter_max_ms: 2500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub budget_secs: u64,
    pub reserve_secs: u64,
    /// Set both to zero to disable the pause between articles
    pub cooldown_min_ms: u64,
    pub cooldown_max_ms: u64,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            budget_secs: 900,
            reserve_secs: 45,
            cooldown_min_ms: 2000,
            cooldown_max_ms: 4000,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 400,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            max_wait_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub max_len: usize,
    pub default_tags: Vec<String>,
    /// How many of an article's own hashtags follow the default tags
    pub extra_tags: usize,
    pub fallback_tag: String,
    pub post_pause_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            max_len: 280,
            default_tags: vec!["#AI".to_string()],
            extra_tags: 2,
            fallback_tag: "#AI".to_string(),
            post_pause_ms: 2000,
        }
    }
}

/// Secrets are only ever read from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub anthropic_api_key: Option<String>,
    pub x_access_token: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub scrape: ScrapeConfig,
    pub dispatch: DispatchConfig,
    pub worker: WorkerConfig,
    pub poll: PollSettings,
    pub thread: ThreadConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

fn parse_env<T: std::str::FromStr>(var: &str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value,
    })
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml, &path.display().to_string())
    }

    /// Defaults, then `path` if given, then the process environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PAPERTHREAD_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PAPERTHREAD_RESULT_PREFIX") {
            self.storage.result_prefix = v;
        }
        if let Some(v) = lookup("PAPERTHREAD_SCRAPER_PREFIX") {
            self.storage.scraper_prefix = v;
        }
        if let Some(v) = lookup("PAPERTHREAD_LIBRARY_KEY") {
            self.storage.library_key = v;
        }
        if let Some(v) = lookup("PAPERTHREAD_SCRAPE_URL") {
            self.scrape.url = v;
        }
        if let Some(v) = lookup("PAPERTHREAD_SCRAPE_LIMIT") {
            self.scrape.limit = parse_env("PAPERTHREAD_SCRAPE_LIMIT", v)?;
        }
        if let Some(v) = lookup("PAPERTHREAD_CHUNK_SIZE") {
            self.dispatch.chunk_size = parse_env("PAPERTHREAD_CHUNK_SIZE", v)?;
        }
        if let Some(v) = lookup("PAPERTHREAD_MODEL") {
            self.worker.model = v;
        }
        if let Some(v) = lookup("PAPERTHREAD_POLL_INTERVAL_SECS") {
            self.poll.interval_secs = parse_env("PAPERTHREAD_POLL_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("PAPERTHREAD_POLL_MAX_WAIT_SECS") {
            self.poll.max_wait_secs = parse_env("PAPERTHREAD_POLL_MAX_WAIT_SECS", v)?;
        }

        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.credentials.anthropic_api_key = Some(v);
        }
        if let Some(v) = lookup("X_USER_ACCESS_TOKEN") {
            self.credentials.x_access_token = Some(v);
        }
        if let Some(v) = lookup("PAPERTHREAD_WEBHOOK_URL") {
            self.credentials.webhook_url = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.chunk_size == 0 {
            return Err(ConfigError::Invalid("dispatch.chunk_size must be at least 1".into()));
        }
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Invalid("poll.interval_secs must be at least 1".into()));
        }
        if self.poll.max_wait_secs < self.poll.interval_secs {
            return Err(ConfigError::Invalid(
                "poll.max_wait_secs must not be shorter than poll.interval_secs".into(),
            ));
        }
        if self.worker.reserve_secs >= self.worker.budget_secs {
            return Err(ConfigError::Invalid(
                "worker.reserve_secs must be shorter than worker.budget_secs".into(),
            ));
        }
        if self.worker.cooldown_min_ms > self.worker.cooldown_max_ms {
            return Err(ConfigError::Invalid(
                "worker.cooldown_min_ms exceeds worker.cooldown_max_ms".into(),
            ));
        }
        if self.dispatch.throttle_jitter_min_ms > self.dispatch.throttle_jitter_max_ms {
            return Err(ConfigError::Invalid(
                "dispatch.throttle_jitter_min_ms exceeds dispatch.throttle_jitter_max_ms".into(),
            ));
        }
        if self.thread.max_len == 0 {
            return Err(ConfigError::Invalid("thread.max_len must be at least 1".into()));
        }
        if self.storage.library_key.is_empty() {
            return Err(ConfigError::Invalid("storage.library_key must not be empty".into()));
        }
        Ok(())
    }

    pub fn layout(&self) -> ResultLayout {
        ResultLayout::new(self.storage.result_prefix.clone())
    }

    pub fn throttle(&self) -> Throttle {
        Throttle {
            base: Duration::from_millis(self.dispatch.throttle_base_ms),
            jitter_min: Duration::from_millis(self.dispatch.throttle_jitter_min_ms),
            jitter_max: Duration::from_millis(self.dispatch.throttle_jitter_max_ms),
        }
    }

    pub fn worker_budget(&self) -> WorkerBudget {
        let cooldown = (self.worker.cooldown_max_ms > 0).then(|| {
            (
                Duration::from_millis(self.worker.cooldown_min_ms),
                Duration::from_millis(self.worker.cooldown_max_ms),
            )
        });
        WorkerBudget {
            total: Duration::from_secs(self.worker.budget_secs),
            reserve: Duration::from_secs(self.worker.reserve_secs),
            cooldown,
        }
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll.interval_secs),
            max_wait: Duration::from_secs(self.poll.max_wait_secs),
        }
    }

    pub fn post_pause(&self) -> Duration {
        Duration::from_millis(self.thread.post_pause_ms)
    }
}
