//! Consumer abstraction over the broker -- the worker-pool side of the
//! substrate.
//!
//! [`Consumer`] extends [`geneva_broker::ConsumerHandle`] with the
//! additional introspection an [`Executor`](../geneva_executor/index.html)
//! needs for timeout calibration. [`ThreadPoolConsumer`] is the in-process
//! worker-pool implementation; the networked counterpart lives in
//! `geneva-network`.

mod error;
mod thread_pool;

pub use error::ConsumerError;
pub use thread_pool::{ThreadPoolConsumer, ThreadPoolConsumerConfig, ThreadPoolConsumerConfigBuilder};

use geneva_broker::ConsumerHandle;

/// Mnemonic of [`ThreadPoolConsumer`], used by the broker to reject duplicates.
pub const THREAD_POOL_MNEMONIC: &str = "btc";

/// Contract an executor relies on beyond the bare [`ConsumerHandle`] the
/// broker requires: whether the consumer can lose items, and roughly how
/// many units of work it can run at once.
pub trait Consumer: ConsumerHandle {
    /// Whether every submitted item is guaranteed to eventually return.
    /// `true` for the thread-pool consumer (failures are confined to
    /// `process()` exceptions, which still come back with an error status);
    /// `false` for a networked consumer, which can lose items to a client
    /// that disconnects mid-processing.
    fn capable_of_full_return(&self) -> bool;

    /// `(count, exact)`: an estimate of how many processing units this
    /// consumer can run concurrently, and whether that count is exact (a
    /// fixed thread pool) or a guess (networked clients come and go).
    fn n_processing_units_estimate(&self) -> (usize, bool);
}
