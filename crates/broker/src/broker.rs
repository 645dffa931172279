use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use domain::{BufferId, SubstrateError};
use geneva_buffer::BufferPort;
use parking_lot::{Condvar, Mutex};

use crate::consumer_handle::ConsumerHandle;

struct RawState<T> {
    ports: Vec<Weak<BufferPort<T>>>,
}

struct ProcessedState<T> {
    ports: HashMap<BufferId, Weak<BufferPort<T>>>,
}

/// Process-wide multiplexer between many [`BufferPort`]s and many consumers.
///
/// Lock order, whenever more than one is held at once: raw < processed <
/// cursor < consumers. `get` and `put` each touch at most two of these in
/// sequence and never all four, but `enrol_port` and `finalize` do.
pub struct Broker<T> {
    raw: Mutex<RawState<T>>,
    raw_present: Condvar,
    processed: Mutex<ProcessedState<T>>,
    processed_present: Condvar,
    cursor: Mutex<usize>,
    consumers: Mutex<HashMap<&'static str, Arc<dyn ConsumerHandle>>>,
    finalized: AtomicBool,
}

impl<T> fmt::Debug for Broker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("port_count", &self.port_count())
            .field("consumer_count", &self.consumer_count())
            .field("finalized", &self.finalized.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Broker<T> {
    /// Create an empty, unfinalized broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: Mutex::new(RawState { ports: Vec::new() }),
            raw_present: Condvar::new(),
            processed: Mutex::new(ProcessedState {
                ports: HashMap::new(),
            }),
            processed_present: Condvar::new(),
            cursor: Mutex::new(0),
            consumers: Mutex::new(HashMap::new()),
            finalized: AtomicBool::new(false),
        }
    }

    /// Enroll a port, assigning it a fresh id and sweeping any ports whose
    /// owning producer has already dropped its handle. Resets the
    /// round-robin cursor to the head, matching the source broker's
    /// behavior: a new enrollment may cause a brief fairness hiccup for
    /// whichever port the cursor was about to visit, which is accepted
    /// rather than engineered away.
    pub fn enrol_port(&self, port: &Arc<BufferPort<T>>) -> BufferId {
        let id = BufferId::new();
        port.bind_id(id);
        {
            let mut raw = self.raw.lock();
            let mut processed = self.processed.lock();
            let mut cursor = self.cursor.lock();
            raw.ports.retain(|w| w.strong_count() > 0);
            processed.ports.retain(|_, w| w.strong_count() > 0);
            raw.ports.push(Arc::downgrade(port));
            processed.ports.insert(id, Arc::downgrade(port));
            *cursor = 0;
        }
        self.raw_present.notify_all();
        self.processed_present.notify_all();
        tracing::info!(port_id = %id, "buffer port enrolled");
        id
    }

    /// Enroll a consumer. A second consumer sharing a mnemonic with one
    /// already registered is silently ignored -- the source broker treats
    /// this as a no-op rather than an error, and this implementation
    /// preserves that.
    pub fn enrol_consumer(&self, consumer: Arc<dyn ConsumerHandle>) {
        let mnemonic = consumer.mnemonic();
        {
            let mut consumers = self.consumers.lock();
            if consumers.contains_key(mnemonic) {
                tracing::warn!(mnemonic, "consumer kind already enrolled, ignoring");
                return;
            }
            consumers.insert(mnemonic, Arc::clone(&consumer));
        }
        tracing::info!(mnemonic, "consumer enrolled");
        consumer.async_start_processing();
    }

    /// Pick the next raw item in round-robin order and pop it, within `timeout`.
    ///
    /// The cursor advances from its pre-call position before the pop, so two
    /// concurrent callers never observe the same position; the pop itself
    /// happens against the position each caller observed, not wherever the
    /// cursor lands afterward. A caller landing on a port that happens to be
    /// empty blocks or times out on that port rather than hopping to a
    /// fuller one -- fairness takes priority over throughput here.
    ///
    /// # Errors
    ///
    /// `SubstrateError::Shutdown` once [`finalize`](Self::finalize) has run;
    /// `SubstrateError::Timeout` if no item was available within `timeout`.
    pub fn get(&self, timeout: Duration) -> Result<(BufferId, T), SubstrateError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.finalized.load(Ordering::Acquire) {
                return Err(SubstrateError::Shutdown);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let port = {
                let mut raw = self.raw.lock();
                if raw.ports.is_empty() {
                    if remaining.is_zero() {
                        return Err(SubstrateError::Timeout);
                    }
                    self.raw_present.wait_for(&mut raw, remaining);
                    continue;
                }
                let mut cursor = self.cursor.lock();
                let pos = *cursor % raw.ports.len();
                if raw.ports.len() > 1 {
                    *cursor = (pos + 1) % raw.ports.len();
                }
                raw.ports[pos].upgrade()
            };
            let Some(port) = port else {
                self.sweep_raw();
                continue;
            };
            if remaining.is_zero() {
                return Err(SubstrateError::Timeout);
            }
            return match port.pop_raw_timeout(remaining) {
                Ok(item) => {
                    let id = port.id().expect("enrolled ports always carry an id");
                    Ok((id, item))
                }
                Err(_) => Err(SubstrateError::Timeout),
            };
        }
    }

    /// Route a processed item back to the port it came from, within `timeout`.
    ///
    /// # Errors
    ///
    /// `SubstrateError::Shutdown` once finalized; `SubstrateError::BufferNotPresent`
    /// if `id` names no currently enrolled port (its producer is gone);
    /// `SubstrateError::Timeout` if the target port's processed queue stayed
    /// full past `timeout`.
    pub fn put(&self, id: BufferId, item: T, timeout: Duration) -> Result<(), SubstrateError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.finalized.load(Ordering::Acquire) {
                return Err(SubstrateError::Shutdown);
            }
            let port = {
                let mut processed = self.processed.lock();
                if processed.ports.is_empty() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(SubstrateError::Timeout);
                    }
                    self.processed_present.wait_for(&mut processed, remaining);
                    continue;
                }
                processed.ports.get(&id).and_then(Weak::upgrade)
            };
            let Some(port) = port else {
                tracing::warn!(port_id = %id, "put targeted a port that is no longer present");
                return Err(SubstrateError::BufferNotPresent);
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SubstrateError::Timeout);
            }
            return port
                .push_processed_timeout(item, remaining)
                .map_err(|_| SubstrateError::Timeout);
        }
    }

    /// Shut every enrolled consumer down and clear all tables. Idempotent.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("broker finalizing");
        let consumers = std::mem::take(&mut *self.consumers.lock());
        for consumer in consumers.values() {
            consumer.shutdown();
        }
        {
            let mut raw = self.raw.lock();
            let mut processed = self.processed.lock();
            raw.ports.clear();
            processed.ports.clear();
        }
        self.raw_present.notify_all();
        self.processed_present.notify_all();
    }

    /// Number of ports whose owning handle is still live. Prunes dead weak
    /// references as a side effect.
    #[must_use]
    pub fn port_count(&self) -> usize {
        self.sweep_raw();
        self.raw.lock().ports.len()
    }

    /// Number of distinct consumer mnemonics currently enrolled.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    fn sweep_raw(&self) {
        let mut raw = self.raw.lock();
        raw.ports.retain(|w| w.strong_count() > 0);
    }
}

impl<T> Drop for Broker<T> {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::Broker;
    use geneva_buffer::BufferPort;
    use std::sync::Arc;
    use std::time::Duration;

    const SHORT: Duration = Duration::from_millis(200);

    #[test]
    fn get_times_out_with_no_ports_enrolled() {
        let broker: Broker<i32> = Broker::new();
        let err = broker.get(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.to_string(), "operation timed out");
    }

    #[test]
    fn round_trip_through_one_port() {
        let broker: Broker<i32> = Broker::new();
        let port = Arc::new(BufferPort::with_default_capacities());
        let id = broker.enrol_port(&port);
        port.push_raw(7);

        let (got_id, item) = broker.get(SHORT).unwrap();
        assert_eq!(got_id, id);
        assert_eq!(item, 7);

        broker.put(got_id, item * 2, SHORT).unwrap();
        assert_eq!(port.pop_processed_timeout(SHORT).unwrap(), 14);
    }

    #[test]
    fn round_robin_alternates_between_two_ports() {
        let broker: Broker<i32> = Broker::new();
        let a = Arc::new(BufferPort::with_default_capacities());
        let b = Arc::new(BufferPort::with_default_capacities());
        let id_a = broker.enrol_port(&a);
        let id_b = broker.enrol_port(&b);
        for i in 0..5 {
            a.push_raw(i);
            b.push_raw(100 + i);
        }

        let mut sequence = Vec::new();
        for _ in 0..10 {
            let (id, _) = broker.get(SHORT).unwrap();
            sequence.push(id);
        }
        let a_count = sequence.iter().filter(|id| **id == id_a).count();
        let b_count = sequence.iter().filter(|id| **id == id_b).count();
        assert_eq!(a_count, 5);
        assert_eq!(b_count, 5);
        for pair in sequence.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn put_to_dropped_port_is_buffer_not_present() {
        let broker: Broker<i32> = Broker::new();
        let port = Arc::new(BufferPort::with_default_capacities());
        broker.enrol_port(&port);
        port.push_raw(1);
        let (got_id, item) = broker.get(SHORT).unwrap();
        drop(port); // only the broker's Weak reference survives now.

        let err = broker.put(got_id, item, SHORT).unwrap_err();
        assert_eq!(err.to_string(), "buffer port is no longer present");
    }

    #[test]
    fn finalize_is_idempotent_and_unblocks_waiters() {
        let broker: Arc<Broker<i32>> = Arc::new(Broker::new());
        let waiter = Arc::clone(&broker);
        let handle = std::thread::spawn(move || waiter.get(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(30));
        broker.finalize();
        broker.finalize();
        let err = handle.join().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "component is shutting down");
    }

    #[test]
    fn enrolling_a_port_resets_the_cursor_to_head() {
        let broker: Broker<i32> = Broker::new();
        let a = Arc::new(BufferPort::with_default_capacities());
        let id_a = broker.enrol_port(&a);
        a.push_raw(1);
        a.push_raw(2);
        let (first, _) = broker.get(SHORT).unwrap();
        assert_eq!(first, id_a);

        let b = Arc::new(BufferPort::with_default_capacities());
        broker.enrol_port(&b);
        b.push_raw(3);
        // cursor reset to head means the newly enrolled port (index 0 after
        // retain/push ordering) or port a -- in either case the very next
        // pickup must not skip straight past an available item.
        let (_, _) = broker.get(SHORT).unwrap();
    }
}
