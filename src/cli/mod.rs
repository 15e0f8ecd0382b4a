//! Command-line interface for tallyd.
//!
//! Every flag can also be set through a `TALLYD_*` environment variable.
//! Just run `tallyd` to listen on UDP 8080 and serve `/metrics` on 9090.

use crate::application::Application;
use crate::core::{Config, ConfigBuilder, LogLevel, Result, TallyError};
use crate::fingerprint::HasherKind;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// UDP telemetry aggregator with a Prometheus scrape endpoint
#[derive(Parser, Debug, Default)]
#[command(name = "tallyd")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Address the UDP listener binds to
    #[arg(long, env = "TALLYD_UDP_HOST")]
    pub udp_host: Option<IpAddr>,

    /// UDP listener port
    #[arg(long, env = "TALLYD_UDP_PORT")]
    pub udp_port: Option<u16>,

    /// Receive buffer size; longer datagrams are truncated
    #[arg(long, env = "TALLYD_UDP_BUFFER_SIZE")]
    pub udp_buffer_size: Option<usize>,

    /// Address the metrics endpoint binds to
    #[arg(long, env = "TALLYD_METRICS_HOST")]
    pub metrics_host: Option<IpAddr>,

    /// Metrics endpoint port
    #[arg(long, env = "TALLYD_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Disable the metrics endpoint
    #[arg(long, env = "TALLYD_NO_METRICS")]
    pub no_metrics: bool,

    /// Ingress queue capacity in samples
    #[arg(long, env = "TALLYD_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Time allowed for the worker to drain on shutdown (e.g. "1s", "500ms")
    #[arg(long, env = "TALLYD_SHUTDOWN_TIMEOUT", value_parser = parse_duration)]
    pub shutdown_timeout: Option<Duration>,

    /// Fingerprint algorithm: fnv (alias prom) or sha256
    #[arg(long, env = "TALLYD_HASHER")]
    pub hasher: Option<HasherKind>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, env = "TALLYD_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Include targets, thread ids and line numbers in log lines
    #[arg(long, env = "TALLYD_STRUCTURED_LOGS")]
    pub structured_logs: bool,

    /// Configuration file path (default: ~/.config/tallyd/config.yaml)
    #[arg(short, long, env = "TALLYD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("tallyd").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/tallyd/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.apply_overrides(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(TallyError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.apply_overrides(builder)
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(host) = self.udp_host {
            builder = builder.udp_host(host);
        }
        if let Some(port) = self.udp_port {
            builder = builder.udp_port(port);
        }
        if let Some(size) = self.udp_buffer_size {
            builder = builder.udp_buffer_size(size);
        }
        if let Some(host) = self.metrics_host {
            builder = builder.metrics_host(host);
        }
        if let Some(port) = self.metrics_port {
            builder = builder.metrics_port(port);
        }
        if self.no_metrics {
            builder = builder.metrics_enabled(false);
        }
        if let Some(capacity) = self.queue_capacity {
            builder = builder.queue_capacity(capacity);
        }
        if let Some(timeout) = self.shutdown_timeout {
            builder = builder.shutdown_timeout(timeout);
        }
        if let Some(hasher) = self.hasher {
            builder = builder.hasher(hasher);
        }
        if let Some(level) = self.log_level {
            builder = builder.log_level(level);
        }
        if self.structured_logs {
            builder = builder.structured_logging(true);
        }

        builder.build()
    }

    /// Initialize logging.
    ///
    /// `RUST_LOG` wins over the configured level when it is set.
    pub fn init_logging(&self, level: LogLevel, structured: bool) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

        let fmt_layer = if structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TallyError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute tallyd.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  UDP listener: {}:{}", config.server.udp_host, config.server.udp_port);
        println!("  UDP buffer size: {}", config.server.udp_buffer_size);
        if config.metrics.enabled {
            println!("  Metrics endpoint: {}:{}", config.metrics.host, config.metrics.port);
        } else {
            println!("  Metrics endpoint: disabled");
        }
        println!("  Queue capacity: {}", config.collector.queue_capacity);
        println!("  Shutdown timeout: {:?}", config.collector.shutdown_timeout);
        println!("  Hasher: {}", config.collector.hasher.as_str());
        return Ok(());
    }

    cli.init_logging(config.logging.level, config.logging.structured)?;

    Application::new(config)?.run().await
}
