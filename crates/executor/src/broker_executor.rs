use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::WorkItem;
use geneva_broker::Broker;
use geneva_buffer::BufferPort;

use crate::algorithm::{erase_unprocessed, pending_positions, sort_old_items_by_position, Executor};
use crate::error::ExecutorError;
use crate::policy::ReturnPolicy;
use crate::report::BatchOutcome;

/// Configuration for a [`BrokerExecutor`].
#[derive(Debug, Clone)]
pub struct BrokerExecutorConfig {
    /// Completion policy. A `wait_factor` of `0.0` forces this to
    /// [`ReturnPolicy::FullReturn`] regardless of what is configured here,
    /// matching how the source implementation actually behaves.
    pub policy: ReturnPolicy,
    /// Multiplier applied to the very first item's latency to calibrate the
    /// first batch's timeout.
    pub initial_wait_factor: f64,
    /// Multiplier applied to the rolling average latency for every
    /// subsequent calibration, including later batches.
    pub wait_factor: f64,
    /// Deadline for pushing one item into the local port's raw queue.
    pub submit_timeout: Duration,
}

/// Builder for [`BrokerExecutorConfig`].
#[derive(Debug)]
pub struct BrokerExecutorConfigBuilder {
    policy: ReturnPolicy,
    initial_wait_factor: f64,
    wait_factor: f64,
    submit_timeout: Duration,
}

impl BrokerExecutorConfig {
    /// Create a builder. Defaults: `policy = IncompleteReturn`,
    /// `initial_wait_factor = 2.0`, `wait_factor = 2.0`,
    /// `submit_timeout = 1 s`.
    #[must_use]
    pub fn builder() -> BrokerExecutorConfigBuilder {
        BrokerExecutorConfigBuilder {
            policy: ReturnPolicy::IncompleteReturn,
            initial_wait_factor: 2.0,
            wait_factor: 2.0,
            submit_timeout: Duration::from_secs(1),
        }
    }
}

impl BrokerExecutorConfigBuilder {
    /// Override the completion policy.
    #[must_use]
    pub fn policy(mut self, policy: ReturnPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the initial-batch calibration multiplier.
    #[must_use]
    pub fn initial_wait_factor(mut self, factor: f64) -> Self {
        self.initial_wait_factor = factor;
        self
    }

    /// Override the steady-state calibration multiplier.
    #[must_use]
    pub fn wait_factor(mut self, factor: f64) -> Self {
        self.wait_factor = factor;
        self
    }

    /// Override the per-item submit deadline.
    #[must_use]
    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Finalize the configuration.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::InvalidConfig`] if either wait-factor multiplier is negative.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<BrokerExecutorConfig, ExecutorError> {
        if self.initial_wait_factor < 0.0 || self.wait_factor < 0.0 {
            return Err(ExecutorError::InvalidConfig {
                reason: "wait factors must be non-negative".to_owned(),
            });
        }
        let policy = if self.wait_factor == 0.0 {
            ReturnPolicy::FullReturn
        } else {
            self.policy
        };
        Ok(BrokerExecutorConfig {
            policy,
            initial_wait_factor: self.initial_wait_factor,
            wait_factor: self.wait_factor,
            submit_timeout: self.submit_timeout,
        })
    }
}

/// Submits a batch to a [`Broker`] and collects returns under a calibrated
/// timeout, instead of blocking forever or polling a fixed interval.
///
/// Items must be [`Clone`]: the copy that travels through the broker's
/// queues is necessarily a distinct, independently owned value (the queue
/// outlives this call's stack frame), so the original stays in `items`
/// until a processed clone comes back to overwrite it.
#[derive(Debug)]
pub struct BrokerExecutor<T> {
    port: Arc<BufferPort<T>>,
    config: BrokerExecutorConfig,
    counter: u64,
    last_batch_average_latency: Option<Duration>,
}

impl<T: WorkItem + Clone> BrokerExecutor<T> {
    /// Enroll a fresh port with `broker` and build an executor around it.
    #[must_use]
    pub fn new(broker: &Broker<T>, config: BrokerExecutorConfig) -> Self {
        let port = Arc::new(BufferPort::with_default_capacities());
        broker.enrol_port(&port);
        Self {
            port,
            config,
            counter: 0,
            last_batch_average_latency: None,
        }
    }

    /// Current submission counter.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn submit(&self, items: &[T], positions: &[usize]) {
        let id = self.port.id().expect("port was enrolled in new()");
        for &position in positions {
            let mut clone = items[position].clone();
            clone.set_submission_counter(self.counter);
            clone.set_submission_position(position);
            clone.set_buffer_id(id);
            if self.port.push_raw_timeout(clone, self.config.submit_timeout).is_err() {
                tracing::warn!(position, "submit timed out pushing into the local port");
            }
        }
    }

    fn calibrated_timeout(&self, returned_so_far: usize, elapsed_so_far: Duration, expected: usize) -> Duration {
        if self.last_batch_average_latency.is_none() {
            // First batch. Until we have at least one return there is no
            // calibration data yet -- the caller is expected to block
            // indefinitely for it (see `work_on`'s first pop below).
            let average = elapsed_so_far / u32::try_from(returned_so_far.max(1)).unwrap_or(u32::MAX);
            let factor = if returned_so_far <= 1 {
                self.config.initial_wait_factor
            } else {
                self.config.wait_factor
            };
            average.mul_f64(expected as f64 * factor)
        } else {
            self.last_batch_average_latency
                .unwrap_or_default()
                .mul_f64(expected as f64 * self.config.wait_factor)
        }
    }
}

impl<T: WorkItem + Clone> Executor<T> for BrokerExecutor<T> {
    fn work_on(
        &mut self,
        items: &mut Vec<T>,
        needs_processing: &mut Vec<bool>,
        old_items: &mut Vec<T>,
        remove_unprocessed: bool,
    ) -> Result<BatchOutcome, ExecutorError> {
        let pending = pending_positions(needs_processing);
        let expected = pending.len();
        if expected == 0 {
            self.counter += 1;
            return Ok(BatchOutcome::complete(0));
        }
        let counter = self.counter;
        let len = items.len();

        let max_passes = match self.config.policy {
            ReturnPolicy::IncompleteReturn | ReturnPolicy::FullReturn => 1,
            ReturnPolicy::ResubmitAfterTimeout { max_resubmissions } => max_resubmissions + 1,
        };
        let full_return = matches!(self.config.policy, ReturnPolicy::FullReturn);

        self.submit(items, &pending);

        let mut returned = 0usize;
        let mut still_pending = pending;
        let batch_start = Instant::now();

        for pass in 0..max_passes {
            if pass > 0 {
                self.submit(items, &still_pending);
            }
            let pass_start = Instant::now();
            loop {
                if still_pending.is_empty() {
                    break;
                }
                let wait = if full_return {
                    Duration::from_secs(3600)
                } else if returned == 0 && self.last_batch_average_latency.is_none() {
                    // No calibration data exists yet anywhere: block for the
                    // very first return the source implementation ever sees.
                    Duration::from_secs(3600)
                } else {
                    let elapsed = pass_start.elapsed();
                    let target = self.calibrated_timeout(returned, batch_start.elapsed(), expected);
                    target.saturating_sub(elapsed)
                };
                if wait.is_zero() {
                    break;
                }
                match self.port.pop_processed_timeout(wait) {
                    Ok(item) => {
                        let position = item.submission_position();
                        if position >= len {
                            return Err(ExecutorError::ProtocolViolation { position, len });
                        }
                        if item.submission_counter() == counter {
                            let was_pending = still_pending.len();
                            still_pending.retain(|&p| p != position);
                            if still_pending.len() != was_pending {
                                // Fresh return. A position can come back twice
                                // under resubmission; the second copy is a
                                // no-op since `still_pending` no longer names it.
                                items[position] = item;
                                if let Some(slot) = needs_processing.get_mut(position) {
                                    *slot = false;
                                }
                                returned += 1;
                            }
                        } else {
                            old_items.push(item);
                        }
                    }
                    Err(_timeout) => break,
                }
            }
            if still_pending.is_empty() {
                break;
            }
        }

        let complete = still_pending.is_empty();
        let not_returned = still_pending.len();
        if !complete && remove_unprocessed {
            erase_unprocessed(items, needs_processing);
        }
        sort_old_items_by_position(old_items);

        if returned > 0 {
            self.last_batch_average_latency = Some(batch_start.elapsed() / u32::try_from(returned).unwrap_or(1));
        }
        self.counter += 1;

        Ok(BatchOutcome {
            returned,
            not_returned,
            complete,
        })
    }
}
