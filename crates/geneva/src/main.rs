//! Demo wiring for the evaluation substrate.
//!
//! Runs the same ten-candidate batch through three executor variants in
//! turn, so the difference between serial, thread-pool, and broker-backed
//! evaluation is visible in the logs rather than just in the source.
//!
//! # Usage
//!
//! ```text
//! RUST_LOG=info cargo run -p geneva
//! RUST_LOG=geneva_broker=debug,info cargo run -p geneva
//! ```

mod demo_item;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use demo_item::Candidate;
use geneva_broker::Broker;
use geneva_consumer::{ThreadPoolConsumer, ThreadPoolConsumerConfig};
use geneva_executor::{BrokerExecutor, BrokerExecutorConfig, Executor as _, SerialExecutor, ThreadedExecutor, ThreadedExecutorConfig};
use geneva_logger::LoggerConfig;

fn batch(n: usize) -> Vec<Candidate> {
    (0..n).map(|i| Candidate::new(f64::from(i as i32) - 5.0)).collect()
}

fn main() -> anyhow::Result<()> {
    let _guard = geneva_logger::init(LoggerConfig::builder().build()).context("failed to initialize logging")?;

    run_serial_demo()?;
    run_threaded_demo()?;
    run_broker_demo()?;

    Ok(())
}

fn run_serial_demo() -> anyhow::Result<()> {
    tracing::info!("=== serial executor ===");
    let mut executor = SerialExecutor::new();
    let mut items = batch(10);
    let mut needs_processing = vec![true; items.len()];
    let mut old_items = Vec::new();

    let outcome = executor
        .work_on(&mut items, &mut needs_processing, &mut old_items, false)
        .context("serial batch failed")?;

    tracing::info!(returned = outcome.returned, complete = outcome.complete, "serial batch done");
    for item in &items {
        tracing::debug!(position = item.position, fitness = item.fitness, "candidate");
    }
    Ok(())
}

fn run_threaded_demo() -> anyhow::Result<()> {
    tracing::info!("=== threaded executor ===");
    let mut executor = ThreadedExecutor::new(ThreadedExecutorConfig::builder().threads(4).build().unwrap());
    let mut items = batch(10);
    let mut needs_processing = vec![true; items.len()];
    let mut old_items = Vec::new();

    let outcome = executor
        .work_on(&mut items, &mut needs_processing, &mut old_items, false)
        .context("threaded batch failed")?;

    tracing::info!(returned = outcome.returned, complete = outcome.complete, "threaded batch done");
    Ok(())
}

fn run_broker_demo() -> anyhow::Result<()> {
    tracing::info!("=== broker + thread-pool consumer ===");
    let broker: Arc<Broker<Candidate>> = Arc::new(Broker::new());
    let consumer = ThreadPoolConsumer::new(
        Arc::clone(&broker),
        ThreadPoolConsumerConfig::builder()
            .threads(4)
            .poll_timeout(Duration::from_millis(50))
            .build()
            .unwrap(),
    );
    broker.enrol_consumer(consumer);

    let mut executor = BrokerExecutor::new(&broker, BrokerExecutorConfig::builder().build().unwrap());
    let mut items = batch(10);
    let mut needs_processing = vec![true; items.len()];
    let mut old_items = Vec::new();

    let outcome = executor
        .work_on(&mut items, &mut needs_processing, &mut old_items, false)
        .context("broker batch failed")?;

    tracing::info!(
        returned = outcome.returned,
        not_returned = outcome.not_returned,
        complete = outcome.complete,
        "broker batch done"
    );
    broker.finalize();
    Ok(())
}
