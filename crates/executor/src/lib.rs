//! Producer-side orchestration of a batch of work items: submit the ones
//! that need processing, wait for returns under a completion policy, route
//! each one back to its batch slot.
//!
//! Three variants share the same [`Executor`] contract: [`SerialExecutor`]
//! (in-line, no concurrency), [`ThreadedExecutor`] (local thread pool,
//! guaranteed full return), and [`BrokerExecutor`] (goes through a
//! [`geneva_broker::Broker`], so return is only as reliable as the
//! consumers enrolled with it).

mod algorithm;
mod broker_executor;
mod error;
mod policy;
mod report;
mod serial;
mod threaded;

pub use algorithm::Executor;
pub use broker_executor::{BrokerExecutor, BrokerExecutorConfig, BrokerExecutorConfigBuilder};
pub use error::ExecutorError;
pub use policy::ReturnPolicy;
pub use report::BatchOutcome;
pub use serial::SerialExecutor;
pub use threaded::{ThreadedExecutor, ThreadedExecutorConfig, ThreadedExecutorConfigBuilder};
