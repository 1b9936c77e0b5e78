//! Engine configuration
//!
//! Loaded from a TOML or YAML file (picked by extension) and then overlaid
//! with environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `TICKET_STORE_TIMEOUT_MS` | `store_timeout_ms` |
//! | `TICKET_QUEUE_ELIGIBILITY` | `queue.eligibility` (`open_only` / `open_and_assigned`) |
//!
//! ```toml
//! store_timeout_ms = 2000
//!
//! [queue]
//! eligibility = "open_only"
//!
//! [sla.high]
//! first_response_minutes = 30
//! resolution_minutes = 240
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, EngineResult};
use crate::policy::SlaPolicyTable;
use crate::types::TicketStatus;

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 100;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unsupported config format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Which statuses make a ticket visible in the work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEligibility {
    /// Only tickets nobody has picked up yet
    OpenOnly,
    /// Unstarted tickets, whether or not an agent is attached
    #[default]
    OpenAndAssigned,
}

impl QueueEligibility {
    pub fn statuses(&self) -> &'static [TicketStatus] {
        match self {
            Self::OpenOnly => &[TicketStatus::Open],
            Self::OpenAndAssigned => &[TicketStatus::Open, TicketStatus::Assigned],
        }
    }
}

impl FromStr for QueueEligibility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "open_only" | "open" => Ok(Self::OpenOnly),
            "open_and_assigned" => Ok(Self::OpenAndAssigned),
            _ => Err(ConfigError::InvalidValue {
                key: "queue.eligibility".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Queue and pagination settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub eligibility: QueueEligibility,
    /// Page size when the caller does not pass one
    pub default_limit: usize,
    /// Largest page size a caller may request
    pub max_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            eligibility: QueueEligibility::default(),
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl QueueConfig {
    /// Resolve optional paging arguments to a validated `(page, limit)`.
    pub fn page_bounds(&self, page: Option<usize>, limit: Option<usize>) -> EngineResult<(usize, usize)> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.default_limit);
        if page == 0 {
            return Err(EngineError::validation("page", "must be at least 1"));
        }
        if limit == 0 || limit > self.max_limit {
            return Err(EngineError::validation(
                "limit",
                format!("must be between 1 and {}", self.max_limit),
            ));
        }
        Ok((page, limit))
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Priority → SLA durations
    pub sla: SlaPolicyTable,
    /// Upper bound on a single store call
    pub store_timeout_ms: u64,
    pub queue: QueueConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sla: SlaPolicyTable::default(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            queue: QueueConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a `.toml`, `.yaml` or `.yml` file, apply environment
    /// overrides and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let mut config: EngineConfig = match extension.as_str() {
            "toml" => toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: display.clone(),
                source,
            })?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                    path: display.clone(),
                    source,
                })?
            }
            _ => return Err(ConfigError::UnsupportedFormat(display)),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("TICKET_STORE_TIMEOUT_MS") {
            self.store_timeout_ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "TICKET_STORE_TIMEOUT_MS".into(),
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup("TICKET_QUEUE_ELIGIBILITY") {
            self.queue.eligibility = raw.parse()?;
        }
        Ok(())
    }

    /// Fail fast on configuration the engine cannot serve with
    pub fn validate(&self) -> EngineResult<()> {
        self.sla.ensure_complete()?;
        if self.store_timeout_ms == 0 {
            return Err(EngineError::validation(
                "store_timeout_ms",
                "must be positive",
            ));
        }
        if self.queue.default_limit == 0 || self.queue.default_limit > self.queue.max_limit {
            return Err(EngineError::validation(
                "queue.default_limit",
                format!("must be between 1 and {}", self.queue.max_limit),
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
