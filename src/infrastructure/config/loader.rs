//! Layered configuration loading for [`SubagentLimits`].

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::limits::SubagentLimits;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// [`SubagentLimits::validate`] rejected the merged configuration.
    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Loads [`SubagentLimits`] from defaults, then project YAML, then env.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults ([`SubagentLimits::default`])
    /// 2. `.subagent-core/config.yaml` (project config, optional)
    /// 3. `.subagent-core/local.yaml` (project local overrides, optional)
    /// 4. Environment variables (`SUBAGENT_` prefix, highest priority)
    pub fn load() -> Result<SubagentLimits> {
        let limits: SubagentLimits = Figment::new()
            .merge(Serialized::defaults(SubagentLimits::default()))
            .merge(Yaml::file(".subagent-core/config.yaml"))
            .merge(Yaml::file(".subagent-core/local.yaml"))
            .merge(Env::prefixed("SUBAGENT_").split("__"))
            .extract()
            .context("failed to extract SubagentLimits from figment")?;

        Self::validate(&limits)?;
        Ok(limits)
    }

    /// Loads configuration from a specific YAML file, skipping project
    /// config discovery. Useful for tests and explicit `--config` flags.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SubagentLimits> {
        let limits: SubagentLimits = Figment::new()
            .merge(Serialized::defaults(SubagentLimits::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&limits)?;
        Ok(limits)
    }

    /// Validates a merged configuration.
    ///
    /// # Errors
    /// [`ConfigError::ValidationFailed`] if any field is out of range.
    pub fn validate(limits: &SubagentLimits) -> Result<(), ConfigError> {
        limits
            .validate()
            .map_err(ConfigError::ValidationFailed)
    }
}
