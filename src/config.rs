//! Configuration for the access register (CLI, TUI and API server)

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: String,
    /// Fixed offset such as "-03:00"; unset means the host's local zone
    pub utc_offset: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Guard sessions untouched for this many minutes are dropped
    pub session_idle_minutes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
    /// Where the TUI writes its log files
    pub directory: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportingConfig {
    pub top_vehicles: usize,
    pub refresh_seconds: u64,
    pub export_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::builder(&run_mode)?.build()?.try_deserialize()
    }

    fn builder(run_mode: &str) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = AppConfig::default();

        Config::builder()
            // Built-in defaults so a bare checkout runs without any file
            .set_default("database.path", defaults.database.path.to_string_lossy().to_string())?
            .set_default("site.name", defaults.site.name)?
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("server.session_idle_minutes", defaults.server.session_idle_minutes as i64)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .set_default("logging.directory", defaults.logging.directory.to_string_lossy().to_string())?
            .set_default("reporting.top_vehicles", defaults.reporting.top_vehicles as i64)?
            .set_default("reporting.refresh_seconds", defaults.reporting.refresh_seconds as i64)?
            .set_default("reporting.export_dir", defaults.reporting.export_dir.to_string_lossy().to_string())?
            // Optional files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // ACCESS__SERVER__PORT=8080 style overrides
            .add_source(
                Environment::with_prefix("ACCESS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.path", env::var("DATABASE_PATH").ok())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vehiculos_autorizados.db"),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Condominio".to_string(),
            utc_offset: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            session_idle_minutes: 720,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: PathBuf::from("logs"),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_vehicles: 10,
            refresh_seconds: 30,
            export_dir: PathBuf::from("exports"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_files() {
        let config: AppConfig = AppConfig::builder("test-without-files")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.session_idle_minutes, 720);
        assert_eq!(config.reporting.top_vehicles, 10);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.site.utc_offset.is_none());
    }
}
