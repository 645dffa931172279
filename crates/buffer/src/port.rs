use std::fmt;
use std::time::Duration;

use domain::BufferId;
use once_cell::sync::OnceCell;

use crate::bounded::{BoundedBuffer, DEFAULT_BUFFER_CAPACITY};
use crate::error::BufferError;

/// A raw/processed pair of [`BoundedBuffer`]s under one identity.
///
/// A `BufferPort` is a plain data structure: it knows nothing about the
/// broker. The producer that creates one owns it for its entire lifetime
/// (typically behind an `Arc`); the broker it is enrolled with keeps only a
/// non-owning [`std::sync::Weak`] reference, so the port's fate is decided
/// entirely by the producer dropping its handle.
pub struct BufferPort<T> {
    id: OnceCell<BufferId>,
    raw: BoundedBuffer<T>,
    processed: BoundedBuffer<T>,
}

impl<T> fmt::Debug for BufferPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPort")
            .field("id", &self.id.get())
            .field("raw", &self.raw)
            .field("processed", &self.processed)
            .finish()
    }
}

impl<T> Default for BufferPort<T> {
    fn default() -> Self {
        Self::with_default_capacities()
    }
}

impl<T> BufferPort<T> {
    /// Create a port with independently sized raw and processed queues.
    #[must_use]
    pub fn new(raw_capacity: usize, processed_capacity: usize) -> Self {
        Self {
            id: OnceCell::new(),
            raw: BoundedBuffer::new(raw_capacity),
            processed: BoundedBuffer::new(processed_capacity),
        }
    }

    /// Create a port with both queues at [`DEFAULT_BUFFER_CAPACITY`].
    #[must_use]
    pub fn with_default_capacities() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_CAPACITY)
    }

    /// This port's identity, once assigned by a broker's `enrol`. `None` before enrollment.
    #[must_use]
    pub fn id(&self) -> Option<BufferId> {
        self.id.get().copied()
    }

    /// Assign this port's identity. Intended to be called exactly once, by
    /// the broker that enrolls it; later calls are no-ops and return `false`.
    pub fn bind_id(&self, id: BufferId) -> bool {
        self.id.set(id).is_ok()
    }

    /// Producer-side raw push: blocks while the raw queue is full.
    pub fn push_raw(&self, item: T) {
        self.raw.push_front(item);
    }

    /// Producer-side raw push, with a deadline.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::Timeout` if the raw queue stays full past `timeout`.
    pub fn push_raw_timeout(&self, item: T, timeout: Duration) -> Result<(), BufferError> {
        self.raw.push_front_timeout(item, timeout)
    }

    /// Consumer-side raw pop, with a deadline.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::Timeout` if nothing arrives before `timeout`.
    pub fn pop_raw_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        self.raw.pop_back_timeout(timeout)
    }

    /// Consumer-side processed push, with a deadline.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::Timeout` if the processed queue stays full past `timeout`.
    pub fn push_processed_timeout(&self, item: T, timeout: Duration) -> Result<(), BufferError> {
        self.processed.push_front_timeout(item, timeout)
    }

    /// Producer-side processed pop: blocks until a result is available.
    pub fn pop_processed(&self) -> T {
        self.processed.pop_back()
    }

    /// Producer-side processed pop, with a deadline.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::Timeout` if nothing returns before `timeout`.
    pub fn pop_processed_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        self.processed.pop_back_timeout(timeout)
    }

    /// Number of items waiting to be picked up by a consumer.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw.size()
    }

    /// Number of results waiting to be collected by the producer.
    #[must_use]
    pub fn processed_len(&self) -> usize {
        self.processed.size()
    }
}

#[cfg(test)]
mod tests {
    use super::BufferPort;
    use domain::BufferId;
    use std::time::Duration;

    #[test]
    fn bind_id_is_first_wins() {
        let port: BufferPort<i32> = BufferPort::with_default_capacities();
        let first = BufferId::new();
        let second = BufferId::new();
        assert!(port.bind_id(first));
        assert!(!port.bind_id(second));
        assert_eq!(port.id(), Some(first));
    }

    #[test]
    fn raw_and_processed_queues_are_independent() {
        let port: BufferPort<&str> = BufferPort::new(4, 4);
        port.push_raw("item");
        assert_eq!(port.raw_len(), 1);
        assert_eq!(port.processed_len(), 0);
        let popped = port.pop_raw_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(popped, "item");
        assert_eq!(port.raw_len(), 0);
    }

    #[test]
    fn pop_processed_timeout_on_empty_port() {
        let port: BufferPort<i32> = BufferPort::with_default_capacities();
        assert!(port.pop_processed_timeout(Duration::from_millis(10)).is_err());
    }
}
