/// Error kinds shared across the substrate, per the taxonomy every crate maps
/// its own `thiserror` enum onto. Crates that need extra context (a size, a
/// mnemonic, a peer address) define their own enums with `#[from]` or manual
/// conversions into this one where a caller just needs the general shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstrateError {
    /// A bounded wait elapsed before the operation could complete.
    #[error("operation timed out")]
    Timeout,
    /// A `put` targeted a port that is no longer registered.
    #[error("buffer port is no longer present")]
    BufferNotPresent,
    /// The component has been asked to shut down; this is a normal exit, not a fault.
    #[error("component is shutting down")]
    Shutdown,
    /// A malformed message, duplicate registration, or out-of-range tag.
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },
    /// An invariant the process cannot recover from was violated.
    #[error("fatal error: {reason}")]
    Fatal { reason: String },
}
