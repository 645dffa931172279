/// Errors an executor can raise while driving a batch.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A returned item named a `submission_position` outside the batch it
    /// claims to belong to.
    #[error("returned item names submission position {position} but the batch holds only {len} slots")]
    ProtocolViolation {
        /// The out-of-range position the returned item carried.
        position: usize,
        /// Number of slots in the batch that was submitted.
        len: usize,
    },
    /// The supplied configuration is invalid.
    #[error("invalid executor configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}
