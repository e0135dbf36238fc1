//! Environment-driven configuration.

use std::str::FromStr;

use crate::error::ConfigError;

/// Log verbosity accepted by `SERVER_SETTINGS__LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The `tracing` filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::InvalidValue {
                key: "SERVER_SETTINGS__LOG_LEVEL".to_string(),
                message: format!("expected debug|info|warn|error, got {other:?}"),
            }),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Listen port for the push endpoint.
    pub port: u16,
    /// Log level seed for the tracing filter.
    pub log_level: LogLevel,
}

/// Deployment identity. All fields are required at startup.
#[derive(Debug, Clone)]
pub struct BasicSettings {
    pub environment: String,
    pub gcp_project_id: String,
    pub gcp_project_number: String,
    pub app_config_bucket: String,
    pub gcp_service_name: String,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub basic: BasicSettings,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an injected variable lookup.
    ///
    /// Tests pass a closure over a map instead of mutating the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("SERVER_SETTINGS__PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "SERVER_SETTINGS__PORT".to_string(),
                message: e.to_string(),
            })?,
            None => 8080,
        };
        let log_level = match lookup("SERVER_SETTINGS__LOG_LEVEL") {
            Some(raw) => raw.parse()?,
            None => LogLevel::Info,
        };

        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        Ok(Self {
            server: ServerSettings { port, log_level },
            basic: BasicSettings {
                environment: required("BASIC_SETTINGS__ENVIRONMENT")?,
                gcp_project_id: required("BASIC_SETTINGS__GCP_PROJECT_ID")?,
                gcp_project_number: required("BASIC_SETTINGS__GCP_PROJECT_NUMBER")?,
                app_config_bucket: required("BASIC_SETTINGS__APP_CONFIG_BUCKET")?,
                gcp_service_name: required("BASIC_SETTINGS__GCP_SERVICE_NAME")?,
            },
        })
    }
}
