//! Network ingestion front-ends.
//!
//! Receivers own their sockets, turn raw payloads into samples with the
//! protocol parser and hand them to the collector.

pub mod udp;

pub use udp::UdpReceiver;

use crate::metrics::DurationSummary;

/// Ingestion counters of one receiver
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ReceiverStats {
    /// Datagrams read from the socket
    pub datagrams_received: u64,
    /// Samples parsed out of those datagrams
    pub samples_received: u64,
    /// Samples rejected because the ingress queue was full
    pub samples_dropped: u64,
    /// Time spent handling datagrams
    pub handling: DurationSummary,
}
