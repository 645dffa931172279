/// Errors raised by [`crate::RandomFactory`] construction and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    /// A second `RandomFactory` was constructed while one already exists in
    /// this process. Exactly one instance is allowed at a time.
    #[error("a RandomFactory instance already exists in this process")]
    AlreadyInstantiated,
    /// The supplied configuration is invalid.
    #[error("invalid random factory configuration: packet_size and buffer_capacity must be >= 1")]
    InvalidConfig,
}
