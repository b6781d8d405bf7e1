//! Service configuration, layered from built-in defaults, an optional TOML
//! file and `PETCLASSIFIER__*` environment variables

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Default config file looked up when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "pet-classifier.toml";

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,actix_web=info";

/// Prefix for environment overrides, e.g. `PETCLASSIFIER__BREED__PREDICTION_KEY`
pub const ENV_PREFIX: &str = "PETCLASSIFIER";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub breed: CustomVisionSettings,
    pub animal_type: CustomVisionSettings,
    pub age: AgeSettings,
    pub policy: PolicySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,

    /// Largest accepted image upload
    pub max_upload_bytes: usize,
}

/// Where a Custom Vision classification project is published
#[derive(Clone, Deserialize)]
pub struct CustomVisionSettings {
    pub endpoint: String,
    pub project_id: String,
    pub published_name: String,
    pub prediction_key: String,
}

impl fmt::Debug for CustomVisionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CustomVisionSettings {{ endpoint: {:?}, project_id: {:?}, published_name: {:?}, prediction_key: <redacted> }}",
            self.endpoint, self.project_id, self.published_name
        )
    }
}

/// The remote dog age inference app
#[derive(Clone, Deserialize)]
pub struct AgeSettings {
    pub base_url: String,
    pub api_name: String,
    pub token: Option<String>,

    /// Directory for the transient upload file; the OS temp dir when unset
    pub scratch_dir: Option<PathBuf>,
}

impl fmt::Debug for AgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AgeSettings {{ base_url: {:?}, api_name: {:?}, token: {}, scratch_dir: {:?} }}",
            self.base_url,
            self.api_name,
            if self.token.is_some() { "<redacted>" } else { "None" },
            self.scratch_dir
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    pub adapter_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub transport_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Settings {
    /// Load settings from `path` (if it exists) and the environment
    pub fn load(path: &str) -> Result<Self> {
        Self::builder()?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Load settings from an in-memory TOML document, ignoring the environment
    pub fn from_toml(doc: &str) -> Result<Self> {
        Self::builder()?
            .add_source(File::from_str(doc, FileFormat::Toml))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("age.api_name", "/predict")?
            .set_default("policy.adapter_timeout_secs", 20)?
            .set_default("policy.connect_timeout_secs", 5)?
            .set_default("policy.transport_retries", 0)?
            .set_default("policy.retry_backoff_ms", 200)?)
    }
}
