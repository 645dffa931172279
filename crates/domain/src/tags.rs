use std::fmt;

/// Opaque identity of a `BufferPort`, assigned by the broker at enrollment time.
///
/// Wraps a `Uuid` rather than exposing one directly so that the broker and
/// buffer crates can evolve the underlying representation without touching
/// every call site that tags a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct BufferId(uuid::Uuid);

impl BufferId {
    /// Mint a fresh, randomly generated id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wrap an externally supplied UUID, e.g. one decoded off the wire.
    #[must_use]
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID, for logging or wire encoding.
    #[must_use]
    pub fn as_uuid(self) -> uuid::Uuid {
        self.0
    }
}

impl Default for BufferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing state of a work item, mutated only by whoever calls `process()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProcessingStatus {
    /// Submitted but not yet run through `process()`.
    Unprocessed,
    /// `process()` ran to completion without error.
    ProcessedOk,
    /// `process()` raised an error, which was caught at the worker boundary.
    ProcessedError,
}

impl ProcessingStatus {
    /// True for either terminal outcome (`ProcessedOk` or `ProcessedError`).
    #[must_use]
    pub fn is_done(self) -> bool {
        !matches!(self, Self::Unprocessed)
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferId, ProcessingStatus};

    #[test]
    fn distinct_new_ids_are_not_equal() {
        assert_ne!(BufferId::new(), BufferId::new());
    }

    #[test]
    fn from_uuid_round_trips() {
        let uuid = uuid::Uuid::new_v4();
        assert_eq!(BufferId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn is_done_only_for_terminal_states() {
        assert!(!ProcessingStatus::Unprocessed.is_done());
        assert!(ProcessingStatus::ProcessedOk.is_done());
        assert!(ProcessingStatus::ProcessedError.is_done());
    }
}
