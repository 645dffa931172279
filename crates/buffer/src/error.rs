/// Errors raised by [`crate::BoundedBuffer`] and [`crate::BufferPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// A timed push or pop did not complete before its deadline.
    #[error("buffer operation timed out")]
    Timeout,
}
