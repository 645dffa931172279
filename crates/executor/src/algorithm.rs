use domain::WorkItem;

use crate::error::ExecutorError;
use crate::report::BatchOutcome;

/// Shared shape of `work_on` across the serial, threaded and broker
/// variants: submit whatever is flagged unprocessed, wait for it under
/// whatever policy the variant implements, route returns back into their
/// batch slot, and optionally drop what never came back.
pub trait Executor<T: WorkItem> {
    /// Run one batch to completion (or to its timeout). `items` and
    /// `needs_processing` must be the same length; `old_items` accumulates
    /// returns that belong to an earlier batch, sorted by submission
    /// position on return.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::ProtocolViolation`] if a returned item names a
    /// submission position outside `items`.
    fn work_on(
        &mut self,
        items: &mut Vec<T>,
        needs_processing: &mut Vec<bool>,
        old_items: &mut Vec<T>,
        remove_unprocessed: bool,
    ) -> Result<BatchOutcome, ExecutorError>;
}

pub(crate) fn pending_positions(needs_processing: &[bool]) -> Vec<usize> {
    needs_processing
        .iter()
        .enumerate()
        .filter_map(|(i, &flag)| flag.then_some(i))
        .collect()
}

pub(crate) fn erase_unprocessed<T>(items: &mut Vec<T>, needs_processing: &mut Vec<bool>) {
    let mut i = 0;
    while i < items.len() {
        if needs_processing[i] {
            items.remove(i);
            needs_processing.remove(i);
        } else {
            i += 1;
        }
    }
}

pub(crate) fn sort_old_items_by_position<T: WorkItem>(old_items: &mut [T]) {
    old_items.sort_by_key(WorkItem::submission_position);
}
