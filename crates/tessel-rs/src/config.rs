//! Session configuration.
//!
//! An [`EngineConfig`] names the backend priority list and the execution mode chosen at load
//! time. It can be built in code, parsed from JSON, and adjusted through `TESSEL_BACKENDS`
//! (comma-separated ids, highest priority first) and `TESSEL_EXECUTION_MODE` (`sync`/`async`).

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::BackendId;
use crate::error::{EngineError, EngineResult};

pub const BACKENDS_ENV: &str = "TESSEL_BACKENDS";
pub const EXECUTION_MODE_ENV: &str = "TESSEL_EXECUTION_MODE";

/// Entry point a loaded network is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

impl ExecutionMode {
    fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "sync" | "synchronous" => Some(ExecutionMode::Sync),
            "async" | "asynchronous" => Some(ExecutionMode::Async),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sync => f.write_str("sync"),
            ExecutionMode::Async => f.write_str("async"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend ids in descending priority.
    pub backends: Vec<BackendId>,
    pub execution_mode: ExecutionMode,
}

impl EngineConfig {
    pub fn new<I, B>(backends: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BackendId>,
    {
        Self {
            backends: backends.into_iter().map(Into::into).collect(),
            execution_mode: ExecutionMode::default(),
        }
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn from_json_str(src: &str) -> EngineResult<Self> {
        serde_json::from_str(src).map_err(|err| EngineError::Config(err.to_string()))
    }

    pub fn to_json_string(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| EngineError::Config(err.to_string()))
    }

    /// Applies `TESSEL_BACKENDS` and `TESSEL_EXECUTION_MODE` when they are set and non-empty.
    pub fn with_env_overrides(self) -> EngineResult<Self> {
        let backends = env::var(BACKENDS_ENV).ok();
        let mode = env::var(EXECUTION_MODE_ENV).ok();
        self.with_overrides(backends.as_deref(), mode.as_deref())
    }

    fn with_overrides(mut self, backends: Option<&str>, mode: Option<&str>) -> EngineResult<Self> {
        if let Some(value) = backends.filter(|v| !v.trim().is_empty()) {
            self.backends = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(BackendId::from)
                .collect();
            tracing::debug!(backends = ?self.backends, "backend priority overridden from environment");
        }
        if let Some(value) = mode.filter(|v| !v.trim().is_empty()) {
            self.execution_mode = ExecutionMode::parse(value).ok_or_else(|| {
                EngineError::Config(format!(
                    "{EXECUTION_MODE_ENV} must be 'sync' or 'async', got '{value}'"
                ))
            })?;
        }
        Ok(self)
    }
}
