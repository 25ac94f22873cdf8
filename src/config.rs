//! Configuration file handling
//!
//! Settings come from `bagslice.toml` (or `--config <path>`); every field
//! is optional and falls back to the defaults below.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use bagslice_filter::{DEFAULT_POLL_INTERVAL, RunOptions};
use bagslice_types::DEFAULT_SERIALIZATION_FORMAT;

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "bagslice.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Observer tick in milliseconds
    pub poll_interval_ms: u64,
    /// Tag used when declaring channels on the destination
    pub serialization_format: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            serialization_format: DEFAULT_SERIALIZATION_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Draw a progress bar instead of plain percentage lines
    pub progress_bar: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { progress_bar: true }
    }
}

impl Config {
    /// Load `path`, or `bagslice.toml` if it exists, or the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.poll_interval_ms == 0 {
            anyhow::bail!("run.poll_interval_ms must be greater than 0");
        }
        if self.run.serialization_format.trim().is_empty() {
            anyhow::bail!("run.serialization_format must not be empty");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.run.poll_interval_ms)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            serialization_format: self.run.serialization_format.clone(),
        }
    }
}
