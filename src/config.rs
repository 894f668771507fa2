//! Data-source configuration.
//!
//! Applications load named data-source settings from `config/config.toml` or
//! environment variables using [`DataSourceSettings::load()`]. The settings
//! only describe a backend (name, dialect, url); turning them into a live
//! [`DataSource`](crate::DataSource) is the adapter's job.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct DataSourceSettings {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: i32,
}

fn default_name() -> String {
    "default".to_string()
}

fn default_dialect() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> i32 {
    10
}

impl DataSourceSettings {
    /// Load settings from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        // Build configuration by reading the TOML file (optional) and environment variables
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("BREAKWATER").separator("__"));

        // Try to build the configuration, handling missing or unreadable file
        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // If the file existed but was unreadable (parse error, permission issue, etc.), log a warning and retry with env only
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!("failed to load config file, falling back to env: {err}");
                }
                // Retry using only environment variables as source
                Config::builder()
                    .add_source(Environment::with_prefix("BREAKWATER").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        // If even environment loading fails, return a clear combined error
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // Deserialize the configuration into our DataSourceSettings struct
        let data_source: DataSourceSettings =
            settings.get::<DataSourceSettings>("data_source").map_err(|e| {
                // Provide a clear error if the data_source section is missing or invalid
                ConfigError::Message(format!(
                    "Data-source configuration could not be loaded from file or environment: {}",
                    e
                ))
            })?;

        Ok(data_source)
    }
}
