/// Errors from encoding, decoding, or framing a wire message.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The underlying socket returned an I/O error.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A command token or size/mode field did not parse.
    #[error("protocol violation: {reason}")]
    Protocol { reason: String },
}

/// Errors from running a TCP consumer or remote client.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// A wire-level framing or I/O error.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The client could not connect after exhausting its retry budget.
    #[error("failed to connect after {attempts} attempts")]
    ConnectionFailed {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
    /// The peer stopped acknowledging pings.
    #[error("peer stopped responding to pings")]
    PeerUnresponsive,
    /// A `process()` call running on a blocking worker thread panicked.
    #[error("process() panicked on a worker thread")]
    ProcessingPanicked,
    /// The supplied configuration is invalid.
    #[error("invalid network configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}
