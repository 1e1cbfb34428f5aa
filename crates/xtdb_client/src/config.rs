use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use xtql::ErrorMode;

use crate::errors::Result;

pub const DEFAULT_URL: &str = "http://localhost:3000";

const PREFIX: &str = "XTDB";
const SEPARATOR: &str = "__";

/// Client configuration. Values from an optional TOML file can be overridden
/// with environment variables prefixed with `XTDB__`, e.g. `XTDB__URL`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    /// Pass server errors embedded in results through as plain maps instead
    /// of failing.
    #[serde(default)]
    pub lenient_errors: bool,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub default_tz: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            url: DEFAULT_URL.to_string(),
            lenient_errors: false,
            timeout_secs: None,
            connect_timeout_secs: None,
            default_tz: None,
        }
    }
}

impl ClientConfig {
    /// Load from the environment only.
    pub fn new() -> Result<Self> {
        Self::load(None)
    }

    /// Load from `file`, if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config = Self::base(file, None)?.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Builds the layered configuration: defaults, the optional file, then
    /// environment variables. `env` replaces the process environment when
    /// set.
    pub fn base(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<ConfigBuilder<DefaultState>> {
        let env_config = Environment::with_prefix(PREFIX)
            .separator(SEPARATOR)
            .ignore_empty(true)
            .try_parsing(true)
            .keep_prefix(false)
            .source(env);

        let mut builder = Config::builder()
            .set_default("url", DEFAULT_URL)?
            .set_default("lenient_errors", false)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(true));
        }

        Ok(builder.add_source(env_config))
    }

    pub fn error_mode(&self) -> ErrorMode {
        if self.lenient_errors {
            ErrorMode::Lenient
        } else {
            ErrorMode::Strict
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}
