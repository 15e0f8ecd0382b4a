//! Main application entry point for tallyd.

use crate::api::{self, ApiState};
use crate::collector::Collector;
use crate::core::{Config, Result};
use crate::receiver::UdpReceiver;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Main application struct that wires the UDP receiver, the collector and
/// the scrape endpoint together.
pub struct Application {
    /// The aggregation engine
    collector: Arc<Collector>,
    /// Application configuration
    config: Config,
}

impl Application {
    /// Create a new Application with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let collector = Arc::new(Collector::from_config(config.collector.clone()));

        Ok(Self { collector, config })
    }

    /// Run until ctrl-c is received.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Run until `signal` completes, then shut every component down.
    ///
    /// Front-ends stop first so nothing new is enqueued, then the collector
    /// drains within its configured timeout. The collector is drained on
    /// every exit path once started. The first front-end error is returned
    /// ahead of a drain that did not finish in time, which surfaces as
    /// [`crate::core::TallyError::ShutdownTimeout`].
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Starting tallyd");

        self.collector.start()?;

        let served = self.serve_until(signal).await;
        if let Err(e) = &served {
            tracing::error!("Front-end failed, draining collector: {}", e);
        }

        let stopped = self.collector.shutdown().await;

        let stats = self.collector.stats();
        tracing::info!(
            processed = stats.samples_processed,
            rejected = stats.samples_rejected,
            "tallyd stopped"
        );
        served.and(stopped)
    }

    /// Run the receiver and scrape endpoint until `signal` completes. Every
    /// spawned task has finished when this returns.
    async fn serve_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let receiver =
            Arc::new(UdpReceiver::bind(&self.config.server, Arc::clone(&self.collector)).await?);
        let udp_addr = receiver.local_addr()?;
        let shutdown = CancellationToken::new();

        let mut receiver_handle = {
            let receiver = Arc::clone(&receiver);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { receiver.run(shutdown).await })
        };

        let api_handle = if self.config.metrics.enabled {
            match api::bind(&self.config.metrics).await {
                Ok(listener) => {
                    let state = ApiState::new(Arc::clone(&self.collector))
                        .with_receiver(Arc::clone(&receiver));
                    Some(tokio::spawn(api::serve(listener, state, shutdown.clone())))
                },
                Err(e) => {
                    shutdown.cancel();
                    if let Err(receiver_error) = joined(receiver_handle.await) {
                        tracing::error!("UDP receiver error: {}", receiver_error);
                    }
                    return Err(e);
                },
            }
        } else {
            tracing::info!("Metrics endpoint disabled");
            None
        };

        tracing::info!(
            "tallyd running: UDP on {}, queue capacity {}, hasher {}",
            udp_addr,
            self.config.collector.queue_capacity,
            self.collector.fingerprinter().name()
        );

        let mut receiver_result = None;
        tokio::select! {
            () = signal => {
                tracing::info!("Received shutdown signal, stopping...");
            }
            result = &mut receiver_handle => {
                let result = joined(result);
                if result.is_ok() {
                    tracing::warn!("UDP receiver exited unexpectedly");
                }
                receiver_result = Some(result);
            }
        }

        shutdown.cancel();

        let receiver_result = match receiver_result {
            Some(result) => result,
            None => joined(receiver_handle.await),
        };
        let mut first_error = receiver_result.err();
        if let Some(e) = &first_error {
            tracing::error!("UDP receiver error: {}", e);
        }

        if let Some(handle) = api_handle {
            if let Err(e) = joined(handle.await) {
                tracing::error!("Metrics server error: {}", e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Get a reference to the collector.
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Outcome of a front-end task, with a panic or cancellation as an error
fn joined(result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    result?
}
