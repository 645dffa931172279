use domain::{ProcessingStatus, WorkItem};

use crate::algorithm::{pending_positions, sort_old_items_by_position, Executor};
use crate::error::ExecutorError;
use crate::report::BatchOutcome;

/// Runs every unprocessed item's `process()` in-line, on the calling thread.
///
/// Always completes a batch in full -- there is nothing to time out on --
/// so `remove_unprocessed` never has an effect here. Useful as a baseline
/// and for debugging: no threads, no broker, deterministic ordering.
#[derive(Debug, Default)]
pub struct SerialExecutor {
    counter: u64,
}

impl SerialExecutor {
    /// Create an executor starting at submission counter `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current submission counter (incremented after every batch).
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl<T: WorkItem> Executor<T> for SerialExecutor {
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
        for i in pending {
            items[i].set_submission_counter(counter);
            items[i].set_submission_position(i);
            items[i].process();
            if !items[i].processing_status().is_done() {
                items[i].set_processing_status(ProcessingStatus::ProcessedOk);
            }
            needs_processing[i] = false;
        }
        sort_old_items_by_position(old_items);
        self.counter += 1;
        Ok(BatchOutcome::complete(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, SerialExecutor};
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
    fn processes_every_flagged_item_and_advances_counter() {
        let mut executor = SerialExecutor::new();
        let mut items = vec![square(1), square(2), square(3)];
        let mut flags = vec![true, true, true];
        let mut old_items = Vec::new();

        let outcome = executor.work_on(&mut items, &mut flags, &mut old_items, false).unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.returned, 3);
        assert_eq!(items[1].fitness, Some(4));
        assert_eq!(executor.counter(), 1);
    }

    #[test]
    fn already_processed_items_are_skipped() {
        let mut executor = SerialExecutor::new();
        let mut done = square(5);
        done.fitness = Some(999);
        let mut items = vec![done, square(2)];
        let mut flags = vec![false, true];
        let mut old_items = Vec::new();

        let outcome = executor.work_on(&mut items, &mut flags, &mut old_items, false).unwrap();

        assert_eq!(outcome.returned, 1);
        assert_eq!(items[0].fitness, Some(999));
        assert_eq!(items[1].fitness, Some(4));
    }

    #[test]
    fn empty_batch_is_immediately_complete() {
        let mut executor = SerialExecutor::new();
        let mut items: Vec<Square> = Vec::new();
        let mut flags: Vec<bool> = Vec::new();
        let mut old_items = Vec::new();
        let outcome = executor.work_on(&mut items, &mut flags, &mut old_items, false).unwrap();
        assert_eq!(outcome, super::BatchOutcome::complete(0));
        assert_eq!(executor.counter(), 0);
    }
}
