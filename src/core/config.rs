//! Configuration management for tallyd.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by `cli`)
//! - Validation and defaults

use crate::core::{Result, TallyError};
use crate::fingerprint::HasherKind;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Complete configuration for tallyd
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP ingestion configuration
    pub server: ServerConfig,
    /// Scrape endpoint configuration
    pub metrics: MetricsConfig,
    /// Aggregation engine configuration
    pub collector: CollectorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// UDP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the UDP listener binds to
    pub udp_host: IpAddr,
    /// Port the UDP listener binds to
    pub udp_port: u16,
    /// Receive buffer size in bytes. Datagrams larger than this are
    /// truncated, so it must match what producers send.
    pub udp_buffer_size: usize,
}

/// Prometheus scrape endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve `/metrics` over HTTP
    pub enabled: bool,
    /// Address the HTTP server binds to
    pub host: IpAddr,
    /// Port the HTTP server binds to
    pub port: u16,
}

/// Aggregation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Capacity of the bounded ingress queue
    pub queue_capacity: usize,
    /// How long `stop` waits for the worker to acknowledge
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Fingerprint algorithm, fixed for the process lifetime
    pub hasher: HasherKind,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets, thread ids and line numbers
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            udp_host: IpAddr::from([0, 0, 0, 0]),
            udp_port: 8080,
            udp_buffer_size: 4096,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            enabled: true,
            host: IpAddr::from([0, 0, 0, 0]),
            port: 9090,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            queue_capacity: 1024 * 100,
            shutdown_timeout: Duration::from_secs(1),
            hasher: HasherKind::Fnv,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.udp_buffer_size == 0 {
            return Err(TallyError::config("udp_buffer_size must be greater than 0"));
        }

        // A UDP and a TCP socket may share a port number, but sharing one
        // here is almost always a typo.
        if self.metrics.enabled
            && self.server.udp_port != 0
            && self.server.udp_port == self.metrics.port
            && self.server.udp_host == self.metrics.host
        {
            return Err(TallyError::config(format!(
                "UDP and metrics ports must be different: both set to {}",
                self.server.udp_port
            )));
        }

        if self.collector.queue_capacity == 0 {
            return Err(TallyError::config("queue_capacity must be greater than 0"));
        }

        if self.collector.shutdown_timeout.is_zero() {
            return Err(TallyError::config("shutdown_timeout must be greater than 0"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(TallyError::config(format!("Unknown log level: {}", other))),
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| TallyError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set UDP listen address
    pub fn udp_host(mut self, host: IpAddr) -> Self {
        self.config.server.udp_host = host;
        self
    }

    /// Set UDP listen port
    pub fn udp_port(mut self, port: u16) -> Self {
        self.config.server.udp_port = port;
        self
    }

    /// Set UDP receive buffer size
    pub fn udp_buffer_size(mut self, size: usize) -> Self {
        self.config.server.udp_buffer_size = size;
        self
    }

    /// Set metrics listen address
    pub fn metrics_host(mut self, host: IpAddr) -> Self {
        self.config.metrics.host = host;
        self
    }

    /// Set metrics listen port
    pub fn metrics_port(mut self, port: u16) -> Self {
        self.config.metrics.port = port;
        self
    }

    /// Enable or disable the scrape endpoint
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    /// Set ingress queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.collector.queue_capacity = capacity;
        self
    }

    /// Set collector shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.collector.shutdown_timeout = timeout;
        self
    }

    /// Set fingerprint algorithm
    pub fn hasher(mut self, hasher: HasherKind) -> Self {
        self.config.collector.hasher = hasher;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Toggle structured log output
    pub fn structured_logging(mut self, structured: bool) -> Self {
        self.config.logging.structured = structured;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
