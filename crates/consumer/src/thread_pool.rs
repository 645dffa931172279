//! In-process thread-pool consumer: the `"btc"` mnemonic.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use domain::{ProcessingStatus, SubstrateError, WorkItem};
use geneva_broker::{Broker, ConsumerHandle};

use crate::{Consumer, ConsumerError, THREAD_POOL_MNEMONIC};

/// Runtime configuration for a [`ThreadPoolConsumer`].
///
/// Construct via [`ThreadPoolConsumerConfig::builder`].
#[derive(Debug, Clone, Copy)]
pub struct ThreadPoolConsumerConfig {
    /// Number of worker threads. Resolved from hardware concurrency at
    /// `build()` time if the builder was given `0`.
    pub threads: usize,
    /// Per-attempt deadline for pulling a raw item off the broker.
    pub poll_timeout: Duration,
    /// Per-attempt deadline for returning a processed item to the broker.
    pub put_timeout: Duration,
}

/// Builder for [`ThreadPoolConsumerConfig`].
#[derive(Debug)]
pub struct ThreadPoolConsumerConfigBuilder {
    threads: usize,
    poll_timeout: Duration,
    put_timeout: Duration,
}

impl ThreadPoolConsumerConfig {
    /// Create a builder. Defaults: `threads = 0` (hardware concurrency at
    /// build time), `poll_timeout = 50 ms`, `put_timeout = 1 s`.
    #[must_use]
    pub fn builder() -> ThreadPoolConsumerConfigBuilder {
        ThreadPoolConsumerConfigBuilder {
            threads: 0,
            poll_timeout: Duration::from_millis(50),
            put_timeout: Duration::from_secs(1),
        }
    }
}

impl ThreadPoolConsumerConfigBuilder {
    /// Fix the worker-thread count. `0` means "use hardware concurrency",
    /// resolved when [`build`](Self::build) runs.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Override the raw-pickup poll deadline.
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Override the processed-return deadline.
    #[must_use]
    pub fn put_timeout(mut self, timeout: Duration) -> Self {
        self.put_timeout = timeout;
        self
    }

    /// Resolve defaults and validate.
    ///
    /// # Errors
    ///
    /// Currently infallible, but returns `Result` like its sibling builders
    /// so a future validation rule does not become a breaking signature
    /// change.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ThreadPoolConsumerConfig, ConsumerError> {
        let threads = if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        };
        Ok(ThreadPoolConsumerConfig {
            threads,
            poll_timeout: self.poll_timeout,
            put_timeout: self.put_timeout,
        })
    }
}

#[derive(Debug)]
struct Inner<T> {
    broker: Arc<Broker<T>>,
    config: ThreadPoolConsumerConfig,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Fixed-size pool of OS threads that pull raw items from a [`Broker`], run
/// `process()`, and return results -- the substrate's default worker.
///
/// Panics inside `process()` are caught at the worker boundary and turned
/// into [`ProcessingStatus::ProcessedError`] rather than killing the
/// thread, so one bad item never starves the rest of the pool.
#[derive(Debug)]
pub struct ThreadPoolConsumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: WorkItem> ThreadPoolConsumer<T> {
    /// Create a consumer bound to `broker`. Call
    /// [`async_start_processing`](ConsumerHandle::async_start_processing)
    /// (typically via [`Broker::enrol_consumer`]) to launch its workers.
    #[must_use]
    pub fn new(broker: Arc<Broker<T>>, config: ThreadPoolConsumerConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                broker,
                config,
                shutdown: AtomicBool::new(false),
                handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Number of worker threads this consumer was configured with.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.config.threads
    }

    fn worker_loop(inner: &Arc<Inner<T>>) {
        loop {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            match inner.broker.get(inner.config.poll_timeout) {
                Ok((id, mut item)) => {
                    if catch_unwind(AssertUnwindSafe(|| item.process())).is_err() {
                        tracing::error!("process() panicked; marking item as processed-error");
                        item.set_processing_status(ProcessingStatus::ProcessedError);
                    }
                    match inner.broker.put(id, item, inner.config.put_timeout) {
                        Ok(()) | Err(SubstrateError::Shutdown) => {}
                        Err(SubstrateError::BufferNotPresent) => {
                            tracing::warn!(port_id = %id, "discarding result, producer gone");
                        }
                        Err(SubstrateError::Timeout) => {
                            tracing::warn!(port_id = %id, "discarding result, processed queue full");
                        }
                        Err(other) => {
                            tracing::error!(port_id = %id, error = %other, "unexpected broker error");
                        }
                    }
                }
                Err(SubstrateError::Timeout) => {}
                Err(SubstrateError::Shutdown) => return,
                Err(other) => {
                    tracing::error!(error = %other, "unexpected broker error on pickup");
                }
            }
        }
    }
}

impl<T: WorkItem> ConsumerHandle for ThreadPoolConsumer<T> {
    fn mnemonic(&self) -> &'static str {
        THREAD_POOL_MNEMONIC
    }

    fn async_start_processing(&self) {
        let mut handles = self.inner.handles.lock().expect("handles mutex poisoned");
        for _ in 0..self.inner.config.threads {
            let inner = Arc::clone(&self.inner);
            handles.push(thread::spawn(move || Self::worker_loop(&inner)));
        }
    }

    fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let handles = std::mem::take(&mut *self.inner.handles.lock().expect("handles mutex poisoned"));
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl<T: WorkItem> Consumer for ThreadPoolConsumer<T> {
    fn capable_of_full_return(&self) -> bool {
        true
    }

    fn n_processing_units_estimate(&self) -> (usize, bool) {
        (self.inner.config.threads, true)
    }
}

#[cfg(test)]
mod tests {
    use super::{ThreadPoolConsumer, ThreadPoolConsumerConfig};
    use crate::Consumer;
    use domain::{BufferId, ProcessingStatus, WorkItem};
    use geneva_broker::{Broker, ConsumerHandle};
    use geneva_buffer::BufferPort;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Square {
        buffer_id: Option<BufferId>,
        submission_counter: u64,
        submission_position: usize,
        status: ProcessingStatus,
        value: i64,
        fitness: Option<i64>,
    }

    impl Square {
        fn new(value: i64) -> Self {
            Self {
                buffer_id: None,
                submission_counter: 0,
                submission_position: 0,
                status: ProcessingStatus::Unprocessed,
                value,
                fitness: None,
            }
        }
    }

    impl WorkItem for Square {
        fn buffer_id(&self) -> Option<BufferId> {
            self.buffer_id
        }
        fn set_buffer_id(&mut self, id: BufferId) {
            self.buffer_id = Some(id);
        }
        fn submission_counter(&self) -> u64 {
            self.submission_counter
        }
        fn set_submission_counter(&mut self, counter: u64) {
            self.submission_counter = counter;
        }
        fn submission_position(&self) -> usize {
            self.submission_position
        }
        fn set_submission_position(&mut self, position: usize) {
            self.submission_position = position;
        }
        fn processing_status(&self) -> ProcessingStatus {
            self.status
        }
        fn set_processing_status(&mut self, status: ProcessingStatus) {
            self.status = status;
        }
        fn process(&mut self) {
            if self.value < 0 {
                panic!("negative values are not supported");
            }
            self.fitness = Some(self.value * self.value);
            self.status = ProcessingStatus::ProcessedOk;
        }
    }

    fn build_config(threads: usize) -> ThreadPoolConsumerConfig {
        ThreadPoolConsumerConfig::builder()
            .threads(threads)
            .poll_timeout(Duration::from_millis(20))
            .put_timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[test]
    fn zero_threads_resolves_to_hardware_concurrency() {
        let config = build_config(0);
        assert!(config.threads >= 1);
    }

    #[test]
    fn processes_a_full_batch() {
        let broker: Arc<Broker<Square>> = Arc::new(Broker::new());
        let port = Arc::new(BufferPort::with_default_capacities());
        broker.enrol_port(&port);

        let consumer = ThreadPoolConsumer::new(Arc::clone(&broker), build_config(4));
        broker.enrol_consumer(consumer.clone());

        for i in 0..20 {
            port.push_raw(Square::new(i));
        }

        let mut results = Vec::new();
        for _ in 0..20 {
            results.push(port.pop_processed_timeout(Duration::from_secs(2)).unwrap());
        }
        results.sort_by_key(|r| r.value);
        for (i, item) in results.into_iter().enumerate() {
            assert_eq!(item.fitness, Some((i as i64) * (i as i64)));
            assert_eq!(item.processing_status(), ProcessingStatus::ProcessedOk);
        }
        consumer.shutdown();
    }

    #[test]
    fn panicking_process_is_marked_processed_error_not_lost() {
        let broker: Arc<Broker<Square>> = Arc::new(Broker::new());
        let port = Arc::new(BufferPort::with_default_capacities());
        broker.enrol_port(&port);
        let consumer = ThreadPoolConsumer::new(Arc::clone(&broker), build_config(1));
        broker.enrol_consumer(consumer.clone());

        port.push_raw(Square::new(-5));
        let item = port.pop_processed_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(item.processing_status(), ProcessingStatus::ProcessedError);
        consumer.shutdown();
    }

    #[test]
    fn capable_of_full_return_is_true() {
        let broker: Arc<Broker<Square>> = Arc::new(Broker::new());
        let consumer = ThreadPoolConsumer::new(broker, build_config(2));
        assert!(consumer.capable_of_full_return());
        assert_eq!(consumer.n_processing_units_estimate(), (2, true));
        assert_eq!(ConsumerHandle::mnemonic(consumer.as_ref()), "btc");
    }
}
