/// Errors raised by consumer construction and, via `#[from]`, wrapping the
/// broker errors a worker loop observes but cannot act on itself.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The supplied configuration is invalid.
    #[error("invalid consumer configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}
