use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    /// The ingress queue had no free slot; the sample was dropped.
    #[error("Ingress queue is full: sample dropped")]
    QueueFull,

    #[error("Shutdown timed out: worker did not stop within {timeout_ms}ms")]
    ShutdownTimeout { timeout_ms: u64 },

    #[error("Collector already started")]
    AlreadyStarted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for tallyd operations
pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if the caller may retry the failed operation
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueFull | Self::Network(_))
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::QueueFull => "backpressure",
            Self::ShutdownTimeout { .. } => "shutdown",
            Self::AlreadyStarted => "lifecycle",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
            Self::Join(_) => "async",
        }
    }
}
