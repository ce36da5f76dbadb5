//! Application configuration.
//!
//! Values come from an optional RON file and are then overridden by command
//! line flags. Every field has a default, so an empty file `()` is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use export_engine::{ApiSettings, FetchSettings, DEFAULT_BASE_URL, DEFAULT_MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub max_concurrency: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let api = ApiSettings::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            connect_timeout_secs: api.connect_timeout.as_secs(),
            request_timeout_secs: api.request_timeout.as_secs(),
            output_dir: PathBuf::from("export"),
        }
    }
}

/// Command line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub max_concurrency: Option<usize>,
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(base_url) = overrides.base_url {
            self.base_url = base_url;
        }
        if let Some(token) = overrides.token {
            self.token = Some(token);
        }
        if let Some(max_concurrency) = overrides.max_concurrency {
            self.max_concurrency = max_concurrency;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..ApiSettings::default()
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_concurrency: self.max_concurrency,
        }
    }
}
