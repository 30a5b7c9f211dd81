//! Configuration system for graphfetch.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment -> CLI overrides.
//! Configuration is loaded from `~/.config/graphfetch/config.toml` and/or
//! `.graphfetch/config.toml` in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a harvest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub batched: BatchedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote query service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    /// Sent on every request; public endpoints throttle anonymous agents.
    pub user_agent: String,
    /// Upper bound on a single request, in seconds.
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "https://query.wikidata.org/sparql".to_string(),
            user_agent: format!(
                "graphfetch/{} (https://github.com/DevJadhav/graphfetch)",
                env!("CARGO_PKG_VERSION")
            ),
            timeout_secs: 30,
        }
    }
}

/// Outbound request budget: at most `max_calls` per `period_ms` window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls allowed per window (0 = unlimited).
    pub max_calls: usize,
    pub period_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 5,
            period_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Retry policy for a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per query, including the first.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
        }
    }
}

/// Offset-paginated driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size substituted for `{limit}`.
    pub limit: u64,
    /// Persist a checkpoint every N pages.
    pub checkpoint_interval: u64,
    /// Stop after N pages (0 = no cap). Meant for trial runs.
    pub max_batches_for_testing: u64,
    /// Pause between pages on top of rate limiting.
    pub courtesy_delay_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            limit: 1000,
            checkpoint_interval: 2,
            max_batches_for_testing: 0,
            courtesy_delay_ms: 1000,
        }
    }
}

/// Key-batched concurrent driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchedConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    /// Persist a checkpoint every N completed batches.
    pub checkpoint_frequency: usize,
    /// Only source values starting with this prefix are treated as keys.
    pub key_prefix: String,
    /// Prepended to each id inside `{qid_list}`.
    pub id_prefix: String,
    /// Prepended to the run name to form the final artifact name.
    pub output_prefix: String,
}

impl Default for BatchedConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_workers: 3,
            checkpoint_frequency: 10,
            key_prefix: "http://www.wikidata.org/entity".to_string(),
            id_prefix: "wd:".to_string(),
            output_prefix: "wikidata_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for final artifacts, `checkpoints/` and `logs/`.
    pub target_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("data"),
        }
    }
}

impl HarvestConfig {
    /// Reject settings that would make a run loop forever or never start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        match url::Url::parse(&self.endpoint.url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            Ok(u) => {
                return Err(ConfigError::Invalid {
                    message: format!("endpoint.url must be http(s), got '{}'", u.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid {
                    message: format!("endpoint.url '{}' is not a URL: {e}", self.endpoint.url),
                });
            }
        }
        if self.endpoint.timeout_secs == 0 {
            return invalid("endpoint.timeout_secs must be greater than zero");
        }
        if self.rate_limit.max_calls > 0 && self.rate_limit.period_ms == 0 {
            return invalid("rate_limit.period_ms must be greater than zero");
        }
        if self.retry.max_retries == 0 {
            return invalid("retry.max_retries must be at least 1");
        }
        if self.retry.backoff_multiplier <= 0.0 || !self.retry.backoff_multiplier.is_finite() {
            return invalid("retry.backoff_multiplier must be a positive number");
        }
        if self.pagination.limit == 0 {
            return invalid("pagination.limit must be greater than zero");
        }
        if self.pagination.checkpoint_interval == 0 {
            return invalid("pagination.checkpoint_interval must be greater than zero");
        }
        if self.batched.batch_size == 0 {
            return invalid("batched.batch_size must be greater than zero");
        }
        if self.batched.max_workers == 0 {
            return invalid("batched.max_workers must be greater than zero");
        }
        if self.batched.checkpoint_frequency == 0 {
            return invalid("batched.checkpoint_frequency must be greater than zero");
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "graphfetch", "graphfetch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-local configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".graphfetch").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `GRAPHFETCH_`)
/// 3. An explicit config file (`--config`)
/// 4. Workspace-local config (`.graphfetch/config.toml`)
/// 5. User config (`~/.config/graphfetch/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&HarvestConfig>,
) -> Result<HarvestConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(HarvestConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    }

    // GRAPHFETCH_PAGINATION__LIMIT, GRAPHFETCH_ENDPOINT__URL, etc.
    figment = figment.merge(Env::prefixed("GRAPHFETCH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
