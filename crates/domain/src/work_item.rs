use crate::tags::{BufferId, ProcessingStatus};

/// Contract every item submitted to the substrate must satisfy.
///
/// The four tag accessors are bookkeeping the substrate owns; implementors
/// should not assign meaning to them beyond what the broker and executor
/// write. `process()` carries the actual domain computation and must not
/// unwind across the call -- catch whatever the computation can raise and
/// record [`ProcessingStatus::ProcessedError`] instead. Worker loops apply
/// `std::panic::catch_unwind` as a second line of defense, but a `process()`
/// that relies on that is not honoring the contract.
pub trait WorkItem: Send + 'static {
    /// Id of the `BufferPort` this item was submitted through, if any.
    fn buffer_id(&self) -> Option<BufferId>;

    /// Stamp the originating port id. Called once, at submission time.
    fn set_buffer_id(&mut self, id: BufferId);

    /// Batch number assigned by the executor that submitted this item.
    fn submission_counter(&self) -> u64;

    /// Stamp the batch number. Called once, at submission time.
    fn set_submission_counter(&mut self, counter: u64);

    /// Index of this item within its submission batch.
    fn submission_position(&self) -> usize;

    /// Stamp the batch index. Called once, at submission time.
    fn set_submission_position(&mut self, position: usize);

    /// Current processing state.
    fn processing_status(&self) -> ProcessingStatus;

    /// Set the processing state. Called by `process()` and by workers that
    /// catch a panic it did not handle itself.
    fn set_processing_status(&mut self, status: ProcessingStatus);

    /// Run the domain computation, mutating whatever payload fields carry
    /// the result, and leave `processing_status` in a terminal state.
    fn process(&mut self);
}
