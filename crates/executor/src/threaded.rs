use domain::{ProcessingStatus, WorkItem};

use crate::algorithm::{pending_positions, sort_old_items_by_position, Executor};
use crate::error::ExecutorError;
use crate::report::BatchOutcome;

/// Configuration for a [`ThreadedExecutor`].
#[derive(Debug, Clone)]
pub struct ThreadedExecutorConfig {
    /// Worker threads spun up per batch. `0` resolves to hardware concurrency.
    pub threads: usize,
}

/// Builder for [`ThreadedExecutorConfig`].
#[derive(Debug, Default)]
pub struct ThreadedExecutorConfigBuilder {
    threads: usize,
}

impl ThreadedExecutorConfig {
    /// Create a builder with `threads = 0` (hardware concurrency).
    #[must_use]
    pub fn builder() -> ThreadedExecutorConfigBuilder {
        ThreadedExecutorConfigBuilder::default()
    }
}

impl ThreadedExecutorConfigBuilder {
    /// Fix the worker count. `0` resolves to hardware concurrency at batch time.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Finalize the configuration.
    ///
    /// # Errors
    ///
    /// Infallible today; returns `Result` to match its sibling builders.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<ThreadedExecutorConfig, ExecutorError> {
        Ok(ThreadedExecutorConfig { threads: self.threads })
    }
}

/// Distributes a batch across a fixed-size local thread pool, re-created
/// for each batch. `submission_position` routing is trivial here: each
/// worker holds a direct `&mut T` borrow of its item's own slot, so there
/// is no processed-queue matching to do. Full return is guaranteed -- a
/// worker that doesn't panic always writes its item's result back.
#[derive(Debug)]
pub struct ThreadedExecutor {
    config: ThreadedExecutorConfig,
    counter: u64,
}

impl ThreadedExecutor {
    /// Create an executor with the given worker-count configuration.
    #[must_use]
    pub fn new(config: ThreadedExecutorConfig) -> Self {
        Self { config, counter: 0 }
    }

    /// Current submission counter.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl<T: WorkItem> Executor<T> for ThreadedExecutor {
    fn work_on(
        &mut self,
        items: &mut Vec<T>,
        needs_processing: &mut Vec<bool>,
        old_items: &mut Vec<T>,
        _remove_unprocessed: bool,
    ) -> Result<BatchOutcome, ExecutorError> {
        let pending = pending_positions(needs_processing);
        let expected = pending.len();
        if expected == 0 {
            return Ok(BatchOutcome::complete(0));
        }
        let counter = self.counter;
        let threads = if self.config.threads == 0 {
            num_cpus::get()
        } else {
            self.config.threads
        };

        let mut slots: Vec<(usize, &mut T)> = items
            .iter_mut()
            .enumerate()
            .zip(needs_processing.iter())
            .filter_map(|((i, item), &flag)| flag.then_some((i, item)))
            .collect();
        for (position, item) in &mut slots {
            item.set_submission_counter(counter);
            item.set_submission_position(*position);
        }

        std::thread::scope(|scope| {
            let (tx, rx) = crossbeam_channel::unbounded::<(usize, &mut T)>();
            for slot in slots {
                tx.send(slot).expect("receiver outlives this scope");
            }
            drop(tx);
            for _ in 0..threads {
                let rx = rx.clone();
                scope.spawn(move || {
                    while let Ok((_, item)) = rx.recv() {
                        item.process();
                        if !item.processing_status().is_done() {
                            item.set_processing_status(ProcessingStatus::ProcessedOk);
                        }
                    }
                });
            }
        });

        for &position in &pending {
            needs_processing[position] = false;
        }
        sort_old_items_by_position(old_items);
        self.counter += 1;
        Ok(BatchOutcome::complete(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, ThreadedExecutor, ThreadedExecutorConfig};
    use domain::{BufferId, ProcessingStatus, WorkItem};

    #[derive(Debug, Clone)]
    struct Square {
        buffer_id: Option<BufferId>,
        submission_counter: u64,
        submission_position: usize,
        status: ProcessingStatus,
        value: i64,
        fitness: Option<i64>,
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
            self.fitness = Some(self.value * self.value);
            self.status = ProcessingStatus::ProcessedOk;
        }
    }

    fn square(value: i64) -> Square {
        Square {
            buffer_id: None,
            submission_counter: 0,
            submission_position: 0,
            status: ProcessingStatus::Unprocessed,
            value,
            fitness: None,
        }
    }

    #[test]
    fn zero_threads_resolves_and_processes_full_batch() {
        let mut executor = ThreadedExecutor::new(ThreadedExecutorConfig::builder().build().unwrap());
        let mut items: Vec<Square> = (0..40).map(square).collect();
        let mut flags = vec![true; 40];
        let mut old_items = Vec::new();

        let outcome = executor.work_on(&mut items, &mut flags, &mut old_items, false).unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.returned, 40);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.fitness, Some((i as i64) * (i as i64)));
        }
    }

    #[test]
    fn fixed_thread_count_still_processes_everything() {
        let mut executor =
            ThreadedExecutor::new(ThreadedExecutorConfig::builder().threads(2).build().unwrap());
        let mut items = vec![square(3), square(4), square(5)];
        let mut flags = vec![true, true, true];
        let mut old_items = Vec::new();
        let outcome = executor.work_on(&mut items, &mut flags, &mut old_items, false).unwrap();
        assert_eq!(outcome.returned, 3);
        assert!(flags.iter().all(|&f| !f));
    }
}
