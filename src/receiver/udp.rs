//! Datagram listener feeding parsed samples into the collector.

use crate::collector::Collector;
use crate::core::{Result, ServerConfig, TallyError};
use crate::metrics::DurationRecorder;
use crate::protocol::parse_samples;
use crate::receiver::ReceiverStats;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// UDP ingestion front-end.
///
/// Each datagram is parsed on its own and every resulting sample is
/// submitted to the collector. A full queue drops the sample and is only
/// counted; the listener never waits for the collector.
pub struct UdpReceiver {
    socket: UdpSocket,
    buffer_size: usize,
    collector: Arc<Collector>,

    datagrams: AtomicU64,
    samples: AtomicU64,
    dropped: AtomicU64,
    handling: DurationRecorder,
}

impl UdpReceiver {
    /// Bind the listening socket
    pub async fn bind(config: &ServerConfig, collector: Arc<Collector>) -> Result<Self> {
        let addr = SocketAddr::new(config.udp_host, config.udp_port);
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            TallyError::network(format!("Failed to bind UDP server to {}: {}", addr, e))
        })?;

        tracing::info!(%addr, buffer_size = config.udp_buffer_size, "UDP receiver bound");

        Ok(Self {
            socket,
            buffer_size: config.udp_buffer_size,
            collector,
            datagrams: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            handling: DurationRecorder::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        // Oversized datagrams are cut to the buffer size by the kernel.
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    tracing::trace!(%peer, len, "Datagram received");
                    self.handle_datagram(&buf[..len]);
                },
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                },
            }
        }

        tracing::info!(
            datagrams = self.datagrams.load(Ordering::Relaxed),
            dropped = self.dropped.load(Ordering::Relaxed),
            "UDP receiver stopped"
        );
        Ok(())
    }

    /// Parse one datagram and submit its samples
    pub fn handle_datagram(&self, datagram: &[u8]) {
        let started = Instant::now();
        self.datagrams.fetch_add(1, Ordering::Relaxed);

        let samples = parse_samples(datagram);
        self.samples.fetch_add(samples.len() as u64, Ordering::Relaxed);

        let mut dropped = 0u64;
        for sample in samples {
            if self.collector.submit(sample).is_err() {
                dropped += 1;
            }
        }

        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::debug!(dropped, "Ingress queue full, samples dropped");
        }

        self.handling.observe(started.elapsed());
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            datagrams_received: self.datagrams.load(Ordering::Relaxed),
            samples_received: self.samples.load(Ordering::Relaxed),
            samples_dropped: self.dropped.load(Ordering::Relaxed),
            handling: self.handling.summary(),
        }
    }
}
