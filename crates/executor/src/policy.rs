/// How a [`crate::BrokerExecutor`] decides a batch is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnPolicy {
    /// Wait until the calibrated timeout elapses; anything still missing is
    /// left unprocessed.
    IncompleteReturn,
    /// Like [`Self::IncompleteReturn`], but resubmits whatever is still
    /// missing and waits again, up to `max_resubmissions` extra passes.
    ResubmitAfterTimeout {
        /// Extra passes attempted beyond the first, before giving up.
        max_resubmissions: u32,
    },
    /// Wait indefinitely. Only sound when every enrolled consumer is
    /// `capable_of_full_return`.
    FullReturn,
}
