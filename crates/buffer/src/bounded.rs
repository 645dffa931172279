use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::BufferError;

/// Capacity used when a caller does not specify one. Large enough that a
/// correctly behaving producer never fills it; the bound exists purely as a
/// safety net against a runaway producer racing ahead of its consumers.
pub const DEFAULT_BUFFER_CAPACITY: usize = 20_000;

/// A capacity-bounded FIFO guarded by one mutex and two condition variables.
///
/// Items enter via [`push_front`](Self::push_front) and leave via
/// [`pop_back`](Self::pop_back) -- the naming mirrors `VecDeque`'s own
/// methods, which this type uses directly as its backing store, so push and
/// pop order match exactly. Waits use the predicate form (loop around the
/// condition) so spurious wakeups never cause a push into a full buffer or a
/// pop from an empty one.
pub struct BoundedBuffer<T> {
    capacity: usize,
    state: Mutex<VecDeque<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.state.lock().len();
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity)
            .field("len", &len)
            .finish()
    }
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer that holds at most `capacity` items at once.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(VecDeque::new()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Create a buffer at [`DEFAULT_BUFFER_CAPACITY`].
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }

    /// Block until there is room, then push.
    pub fn push_front(&self, item: T) {
        let mut guard = self.state.lock();
        self.not_full.wait_while(&mut guard, |q| q.len() >= self.capacity);
        guard.push_front(item);
        drop(guard);
        self.not_empty.notify_one();
    }

    /// Push within `timeout`, or report [`BufferError::Timeout`] with no side effect.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::Timeout` if the buffer is still full once the
    /// deadline passes.
    pub fn push_front_timeout(&self, item: T, timeout: Duration) -> Result<(), BufferError> {
        let mut guard = self.state.lock();
        let deadline = Instant::now() + timeout;
        while guard.len() >= self.capacity {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BufferError::Timeout);
            }
            self.not_full.wait_for(&mut guard, remaining);
        }
        guard.push_front(item);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Non-blocking push: succeeds only if there is room right now.
    pub fn try_push_front(&self, item: T) -> Result<(), BufferError> {
        let mut guard = self.state.lock();
        if guard.len() >= self.capacity {
            return Err(BufferError::Timeout);
        }
        guard.push_front(item);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until an item is available, then pop it.
    pub fn pop_back(&self) -> T {
        let mut guard = self.state.lock();
        self.not_empty.wait_while(&mut guard, |q| q.is_empty());
        let item = guard
            .pop_back()
            .expect("predicate guarantees a non-empty queue");
        drop(guard);
        self.not_full.notify_one();
        item
    }

    /// Pop within `timeout`, or report [`BufferError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns `BufferError::Timeout` if the buffer is still empty once the
    /// deadline passes.
    pub fn pop_back_timeout(&self, timeout: Duration) -> Result<T, BufferError> {
        let mut guard = self.state.lock();
        let deadline = Instant::now() + timeout;
        while guard.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BufferError::Timeout);
            }
            self.not_empty.wait_for(&mut guard, remaining);
        }
        let item = guard
            .pop_back()
            .expect("loop guarantees a non-empty queue");
        drop(guard);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Non-blocking pop: succeeds only if an item is available right now.
    pub fn try_pop_back(&self) -> Option<T> {
        let mut guard = self.state.lock();
        let item = guard.pop_back();
        if item.is_some() {
            drop(guard);
            self.not_full.notify_one();
        }
        item
    }

    /// Number of items currently held. A hint -- may be stale the instant it returns.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.lock().len()
    }

    /// Maximum number of items this buffer will hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `capacity - size`, saturating at zero. A hint, like [`size`](Self::size).
    #[must_use]
    pub fn remaining_space(&self) -> usize {
        self.capacity.saturating_sub(self.size())
    }

    /// Whether the buffer currently holds at least one item.
    #[must_use]
    pub fn is_not_empty(&self) -> bool {
        !self.state.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundedBuffer, BufferError};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order_is_preserved() {
        let buf = BoundedBuffer::new(8);
        for i in 0..5 {
            buf.push_front(i);
        }
        let popped: Vec<_> = (0..5).map(|_| buf.pop_back()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let buf = BoundedBuffer::new(3);
        for i in 0..3 {
            buf.push_front(i);
            assert!(buf.size() <= buf.capacity());
        }
        assert!(buf.try_push_front(99).is_err());
    }

    #[test]
    fn pop_back_timeout_reports_timeout_on_empty_buffer() {
        let buf: BoundedBuffer<i32> = BoundedBuffer::new(4);
        let err = buf.pop_back_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, BufferError::Timeout);
    }

    #[test]
    fn push_front_timeout_reports_timeout_on_full_buffer() {
        let buf = BoundedBuffer::new(1);
        buf.push_front(1);
        let err = buf
            .push_front_timeout(2, Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, BufferError::Timeout);
        assert_eq!(buf.size(), 1);
    }

    #[test]
    fn blocked_pop_wakes_on_later_push() {
        let buf = Arc::new(BoundedBuffer::new(4));
        let reader = Arc::clone(&buf);
        let handle = thread::spawn(move || reader.pop_back());
        thread::sleep(Duration::from_millis(20));
        buf.push_front(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn blocked_push_wakes_on_later_pop() {
        let buf = Arc::new(BoundedBuffer::new(1));
        buf.push_front(1);
        let writer = Arc::clone(&buf);
        let handle = thread::spawn(move || writer.push_front(2));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(buf.pop_back(), 1);
        handle.join().unwrap();
        assert_eq!(buf.pop_back(), 2);
    }
}
