use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::lifecycle::policy::{LifecyclePolicy, PolicyError};

const DEFAULT_DISPATCH_CAPACITY: usize = 256;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lifecycle: LifecycleConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            lifecycle: LifecycleConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Engine settings: the tenant policy file and background work sizing.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub policy_path: Option<PathBuf>,
    pub retain_signal_history: bool,
    pub dispatch_capacity: usize,
    pub signal_webhook_url: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            policy_path: None,
            retain_signal_history: false,
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            signal_webhook_url: None,
        }
    }
}

impl LifecycleConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let policy_path = non_empty_var("APP_POLICY_PATH").map(PathBuf::from);

        let retain_signal_history = match non_empty_var("APP_RETAIN_SIGNAL_HISTORY") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidFlag {
                name: "APP_RETAIN_SIGNAL_HISTORY",
                value: raw,
            })?,
            None => false,
        };

        let dispatch_capacity = match non_empty_var("APP_DISPATCH_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or(ConfigError::InvalidDispatchCapacity)?,
            None => DEFAULT_DISPATCH_CAPACITY,
        };

        Ok(Self {
            policy_path,
            retain_signal_history,
            dispatch_capacity,
            signal_webhook_url: non_empty_var("APP_SIGNAL_WEBHOOK_URL"),
        })
    }

    /// Reads the tenant policy file when one is configured, otherwise the standard policy.
    pub fn load_policy(&self) -> Result<LifecyclePolicy, PolicyError> {
        match &self.policy_path {
            Some(path) => {
                let raw = fs::read_to_string(path)?;
                LifecyclePolicy::from_json(&raw)
            }
            None => Ok(LifecyclePolicy::standard()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { name: &'static str, value: String },
    InvalidDispatchCapacity,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false, got '{value}'")
            }
            ConfigError::InvalidDispatchCapacity => {
                write!(f, "APP_DISPATCH_CAPACITY must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidFlag { .. }
            | ConfigError::InvalidDispatchCapacity => None,
        }
    }
}
