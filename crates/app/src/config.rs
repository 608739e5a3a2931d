use std::sync::OnceLock;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub certificates: CertificateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Private object store serving lesson videos. Unset means no remote media.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateConfig {
    pub base_url: Option<String>,
}

impl AppConfig {
    /// Defaults, then `config.toml`, then `config.{APP_ENV}.toml`, then `LMS_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source is malformed or a value has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Config::builder()
            .set_default("environment", "development")?
            .set_default("log_level", "info")?
            .set_default("database.url", "sqlite://lms.sqlite3")?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name(&format!("config.{environment}")).required(false))
            .add_source(
                Environment::with_prefix("LMS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("environment", std::env::var("APP_ENV").ok())?
            .set_override_option("log_level", std::env::var("RUST_LOG").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?;
        config.try_deserialize()
    }

    /// Load once at startup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if loading fails or the config was already set.
    pub fn init() -> Result<&'static AppConfig, ConfigError> {
        let config = Self::load()?;
        APP_CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("configuration already initialized".into()))?;
        APP_CONFIG
            .get()
            .ok_or_else(|| ConfigError::Message("configuration missing after init".into()))
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> AppConfig {
        Config::builder()
            .set_default("environment", "development")
            .unwrap()
            .set_default("log_level", "info")
            .unwrap()
            .set_default("database.url", "sqlite://lms.sqlite3")
            .unwrap()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let config = from_toml("");
        assert_eq!(config.environment, "development");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database.url, "sqlite://lms.sqlite3");
        assert!(config.media.base_url.is_none());
        assert!(config.certificates.base_url.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            environment = "production"
            log_level = "warn"

            [database]
            url = "sqlite:///var/lib/lms/lms.sqlite3"

            [media]
            base_url = "https://media.example.com"
            "#,
        );
        assert!(config.is_production());
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.database.url, "sqlite:///var/lib/lms/lms.sqlite3");
        assert_eq!(
            config.media.base_url.as_deref(),
            Some("https://media.example.com")
        );
        assert!(config.media.api_key.is_none());
    }
}
