//! Configuration system for Delve.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/delve/config.toml` and/or `.delve/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::research::retry::BackoffSchedule;

/// Shortest finding excerpt that still fits the "..." truncation marker.
const MIN_FINDING_CHARS: usize = 3;

/// Top-level configuration for the research engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelveConfig {
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Knobs for planning, workers, scoring and the session registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Upper bound on workers a plan may budget for (1-10).
    pub max_workers: usize,
    /// How many completed sessions are kept after synthesis.
    pub completed_history_cap: usize,
    /// Maximum characters kept per finding excerpt.
    pub finding_max_chars: usize,
    /// Ranked results kept per individual query.
    pub results_per_query: usize,
    /// Results must score strictly above this to be kept.
    pub min_quality_score: f64,
    /// Results with shorter content are rejected before scoring.
    pub min_content_chars: usize,
    /// `max_results` sent with "basic" depth searches.
    pub basic_max_results: usize,
    /// `max_results` sent with "advanced" depth searches.
    pub advanced_max_results: usize,
    /// Per-attempt timeout for the search collaborator.
    pub search_timeout_ms: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_workers: 6,
            completed_history_cap: 10,
            finding_max_chars: 350,
            results_per_query: 4,
            min_quality_score: 0.3,
            min_content_chars: 100,
            basic_max_results: 6,
            advanced_max_results: 4,
            search_timeout_ms: 30_000,
        }
    }
}

impl ResearchConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

/// Retry behavior for calls to the search collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Ceiling for any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// The exponential schedule described by this config.
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule::new(
            Duration::from_millis(self.initial_backoff_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Logging output settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rolled JSON logs. Disabled when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_dir: None,
        }
    }
}

/// Caller-supplied overrides for [`load_config`].
///
/// Only the fields that are set replace the lower layers; everything left as
/// `None` keeps the value from the user, workspace or environment config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub research: ResearchOverrides,
    #[serde(default)]
    pub retry: RetryOverrides,
    #[serde(default)]
    pub logging: LoggingOverrides,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_history_cap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding_max_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_per_query: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_content_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_dir: Option<PathBuf>,
}

impl DelveConfig {
    /// Validate the configuration, returning a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let r = &self.research;

        if !(1..=10).contains(&r.max_workers) {
            problems.push(format!(
                "research.max_workers must be between 1 and 10 (got {})",
                r.max_workers
            ));
        }
        if r.completed_history_cap == 0 {
            problems.push("research.completed_history_cap must be at least 1".to_string());
        }
        if r.finding_max_chars < MIN_FINDING_CHARS {
            problems.push(format!(
                "research.finding_max_chars must be at least {MIN_FINDING_CHARS} (got {})",
                r.finding_max_chars
            ));
        }
        if r.results_per_query == 0 {
            problems.push("research.results_per_query must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&r.min_quality_score) {
            problems.push(format!(
                "research.min_quality_score must be within [0, 1] (got {})",
                r.min_quality_score
            ));
        }
        if r.basic_max_results == 0 || r.advanced_max_results == 0 {
            problems.push("research max_results values must be at least 1".to_string());
        }
        if r.search_timeout_ms == 0 {
            problems.push("research.search_timeout_ms must be non-zero".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            problems.push(format!(
                "retry.backoff_multiplier must be >= 1.0 (got {})",
                self.retry.backoff_multiplier
            ));
        }

        problems
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument, only the fields that are set)
/// 2. Environment variables (prefixed with `DELVE_`)
/// 3. Workspace-local config (`.delve/config.toml`)
/// 4. User config (`~/.config/delve/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<DelveConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "delve", "delve") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".delve").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (DELVE_RESEARCH__MAX_WORKERS, DELVE_RETRY__MAX_RETRIES, etc.)
    figment = figment.merge(Env::prefixed("DELVE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: DelveConfig = figment.extract().map_err(|e| ConfigError::Load {
        message: e.to_string(),
    })?;

    let problems = config.validate();
    if !problems.is_empty() {
        return Err(ConfigError::Invalid {
            message: problems.join("; "),
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = DelveConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.research.max_workers, 6);
        assert_eq!(config.research.results_per_query, 4);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_validate_catches_out_of_range_workers() {
        let mut config = DelveConfig::default();
        config.research.max_workers = 11;
        config.retry.backoff_multiplier = 0.5;
        let problems = config.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("max_workers"));
    }

    #[test]
    fn test_validate_rejects_tiny_finding_excerpts() {
        let mut config = DelveConfig::default();
        config.research.finding_max_chars = 0;
        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("finding_max_chars"));

        config.research.finding_max_chars = 3;
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_schedule_from_retry_config() {
        let schedule = RetryConfig::default().schedule();
        assert_eq!(schedule.delay_for(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(1), Duration::from_secs(2));
    }

    #[test]
    fn test_workspace_config_layering() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[research]\nmax_workers = 4\nfinding_max_chars = 200\n\n[retry]\nmax_retries = 1\n",
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.max_workers, 4);
        assert_eq!(config.research.finding_max_chars, 200);
        assert_eq!(config.retry.max_retries, 1);
        // Untouched fields keep their defaults
        assert_eq!(config.research.results_per_query, 4);
    }

    #[test]
    fn test_invalid_workspace_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), "[research]\nmax_workers = 0\n").unwrap();

        let err = load_config(Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = ConfigOverrides::default();
        overrides.research.completed_history_cap = Some(3);
        overrides.retry.max_retries = Some(0);
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.research.completed_history_cap, 3);
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_partial_overrides_keep_workspace_values() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".delve");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[research]\nmax_workers = 4\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let mut overrides = ConfigOverrides::default();
        overrides.research.completed_history_cap = Some(3);
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.research.completed_history_cap, 3);
        assert_eq!(config.research.max_workers, 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_empty_overrides_change_nothing() {
        let config = load_config(None, Some(&ConfigOverrides::default())).unwrap();
        assert_eq!(config.research.max_workers, 6);
        assert_eq!(config.research.completed_history_cap, 10);
    }
}
