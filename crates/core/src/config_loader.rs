use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

/// Prefix for environment overrides, e.g. `SMM_STRATEGY__MAIN__DELTA_THRESHOLD=0.55`.
pub const ENV_PREFIX: &str = "SMM_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging defaults, `config/Config.toml`, environment
    /// variables and `config/Config.json`, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or validation fails.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from an explicit TOML file plus environment overrides.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or validation fails.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::default(),
        ))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .join(Json::file("config/Config.json"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        config.validate().context("Invalid configuration")?;
        tracing::debug!(
            path = %path.display(),
            sources = config.bars.sources.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration from an in-memory TOML document (no environment).
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or validation fails.
    pub fn from_toml_str(toml: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::default(),
        ))
        .merge(Toml::string(toml))
        .extract()
        .context("Failed to parse configuration")?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
