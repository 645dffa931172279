use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use geneva_buffer::BoundedBuffer;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::FactoryError;
use crate::seed_manager::SeedManager;

/// A fixed-size packet of uniform `[0, 1)` doubles, cheap to clone (an `Arc`
/// bump) so a producer thread can retry a push after a timeout without
/// regenerating the numbers.
pub type Packet = Arc<[f64]>;

static INSTANTIATED: AtomicBool = AtomicBool::new(false);
static GLOBAL: OnceCell<RandomFactory> = OnceCell::new();

/// Runtime configuration for a [`RandomFactory`].
#[derive(Debug, Clone, Copy)]
pub struct RandomFactoryConfig {
    /// Background producer threads. `0` resolves to hardware concurrency.
    pub producer_threads: usize,
    /// Doubles per packet.
    pub packet_size: usize,
    /// Packets the internal buffer holds before producers block.
    pub buffer_capacity: usize,
}

/// Builder for [`RandomFactoryConfig`].
#[derive(Debug)]
pub struct RandomFactoryConfigBuilder {
    producer_threads: usize,
    packet_size: usize,
    buffer_capacity: usize,
}

impl RandomFactoryConfig {
    /// Create a builder. Defaults: `producer_threads = 0` (hardware
    /// concurrency), `packet_size = 1000`, `buffer_capacity = 16`.
    #[must_use]
    pub fn builder() -> RandomFactoryConfigBuilder {
        RandomFactoryConfigBuilder {
            producer_threads: 0,
            packet_size: 1000,
            buffer_capacity: 16,
        }
    }
}

impl RandomFactoryConfigBuilder {
    /// Fix the producer-thread count. `0` means hardware concurrency.
    #[must_use]
    pub fn producer_threads(mut self, n: usize) -> Self {
        self.producer_threads = n;
        self
    }

    /// Set the number of doubles per packet.
    #[must_use]
    pub fn packet_size(mut self, size: usize) -> Self {
        self.packet_size = size;
        self
    }

    /// Set how many packets the internal buffer holds.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::InvalidConfig` if `packet_size` or
    /// `buffer_capacity` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<RandomFactoryConfig, FactoryError> {
        if self.packet_size == 0 || self.buffer_capacity == 0 {
            return Err(FactoryError::InvalidConfig);
        }
        Ok(RandomFactoryConfig {
            producer_threads: self.producer_threads,
            packet_size: self.packet_size,
            buffer_capacity: self.buffer_capacity,
        })
    }
}

impl Default for RandomFactoryConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is always valid")
    }
}

/// Background producer pool feeding a bounded buffer of `[0, 1)` packets.
///
/// Exactly one instance may exist per process at a time; constructing a
/// second one while the first is alive returns
/// [`FactoryError::AlreadyInstantiated`] rather than aborting, so the
/// invariant stays testable and the decision to treat it as fatal is left to
/// the caller.
#[derive(Debug)]
pub struct RandomFactory {
    buffer: Arc<BoundedBuffer<Packet>>,
    seed_manager: Arc<SeedManager>,
    packet_size: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    producers: Mutex<Vec<JoinHandle<()>>>,
}

impl RandomFactory {
    /// Construct a factory and start its producer pool.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::AlreadyInstantiated` if one already exists in
    /// this process.
    pub fn new(config: RandomFactoryConfig) -> Result<Self, FactoryError> {
        if INSTANTIATED.swap(true, Ordering::AcqRel) {
            return Err(FactoryError::AlreadyInstantiated);
        }
        let factory = Self {
            buffer: Arc::new(BoundedBuffer::new(config.buffer_capacity)),
            seed_manager: Arc::new(SeedManager::new()),
            packet_size: Arc::new(AtomicUsize::new(config.packet_size)),
            shutdown: Arc::new(AtomicBool::new(false)),
            producers: Mutex::new(Vec::new()),
        };
        factory.set_n_producer_threads(config.producer_threads);
        Ok(factory)
    }

    /// The process-wide instance, lazily created with default configuration
    /// on first access. Do not mix with direct [`RandomFactory::new`] calls
    /// in the same process -- whichever runs first wins the single slot.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            Self::new(RandomFactoryConfig::default())
                .expect("RandomFactory::global raced with a direct instantiation")
        })
    }

    /// Commit the master seed. Has effect only if called before the first
    /// seed is drawn by any producer or caller.
    pub fn set_start_seed(&self, seed: u64) -> bool {
        self.seed_manager.set_start_seed(seed)
    }

    /// Pop one packet, waiting up to `timeout`. `None` on timeout, so callers
    /// can back off rather than treating an empty buffer as fatal.
    pub fn new_01_container(&self, timeout: Duration) -> Option<Packet> {
        self.buffer.pop_back_timeout(timeout).ok()
    }

    /// Resize the producer pool. `0` resolves to hardware concurrency.
    /// Implemented by stopping the current pool and starting a fresh one at
    /// the new size, which is simpler than incrementally growing or
    /// shrinking and costs only a brief pause in production.
    pub fn set_n_producer_threads(&self, n: usize) {
        let n = if n == 0 { num_cpus::get() } else { n };
        self.stop_producers();
        self.shutdown.store(false, Ordering::Release);
        let mut handles = self.producers.lock();
        for _ in 0..n {
            let buffer = Arc::clone(&self.buffer);
            let seed_manager = Arc::clone(&self.seed_manager);
            let packet_size = Arc::clone(&self.packet_size);
            let shutdown = Arc::clone(&self.shutdown);
            handles.push(thread::spawn(move || {
                Self::producer_loop(&buffer, &seed_manager, &packet_size, &shutdown);
            }));
        }
    }

    /// Number of producer threads currently running.
    #[must_use]
    pub fn n_producer_threads(&self) -> usize {
        self.producers.lock().len()
    }

    /// Change how many doubles go into each packet produced from now on;
    /// packets already queued or in flight are unaffected.
    pub fn set_packet_size(&self, size: usize) {
        self.packet_size.store(size.max(1), Ordering::Release);
    }

    /// Interrupt and join every producer thread. Idempotent.
    pub fn finalize(&self) {
        self.stop_producers();
    }

    fn stop_producers(&self) {
        self.shutdown.store(true, Ordering::Release);
        let handles = std::mem::take(&mut *self.producers.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn producer_loop(
        buffer: &Arc<BoundedBuffer<Packet>>,
        seed_manager: &Arc<SeedManager>,
        packet_size: &Arc<AtomicUsize>,
        shutdown: &Arc<AtomicBool>,
    ) {
        let mut rng = StdRng::seed_from_u64(u64::from(seed_manager.get_seed()));
        while !shutdown.load(Ordering::Acquire) {
            let size = packet_size.load(Ordering::Acquire);
            let packet: Packet = (0..size).map(|_| rng.random::<f64>()).collect();
            loop {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                if buffer
                    .push_front_timeout(Arc::clone(&packet), Duration::from_millis(100))
                    .is_ok()
                {
                    break;
                }
            }
        }
    }
}

impl Drop for RandomFactory {
    fn drop(&mut self) {
        self.finalize();
        INSTANTIATED.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{RandomFactory, RandomFactoryConfig};
    use std::time::Duration;

    fn small_config() -> RandomFactoryConfig {
        RandomFactoryConfig::builder()
            .producer_threads(1)
            .packet_size(8)
            .buffer_capacity(2)
            .build()
            .unwrap()
    }

    #[test]
    fn packets_contain_only_values_in_unit_interval() {
        let factory = RandomFactory::new(small_config()).unwrap();
        let packet = factory
            .new_01_container(Duration::from_secs(2))
            .expect("a producer thread should deliver a packet");
        assert_eq!(packet.len(), 8);
        for &value in packet.iter() {
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn second_instantiation_is_rejected_while_first_is_alive() {
        let first = RandomFactory::new(small_config()).unwrap();
        let err = RandomFactory::new(small_config()).unwrap_err();
        assert_eq!(err.to_string(), "a RandomFactory instance already exists in this process");
        drop(first);
        // Dropping the first releases the slot for a new instance.
        let _second = RandomFactory::new(small_config()).unwrap();
    }

    #[test]
    fn set_packet_size_affects_subsequent_packets() {
        let factory = RandomFactory::new(small_config()).unwrap();
        // Drain whatever packets of the old size are already in flight.
        while factory.new_01_container(Duration::from_millis(50)).is_some() {}
        factory.set_packet_size(4);
        let packet = factory
            .new_01_container(Duration::from_secs(2))
            .expect("a producer thread should deliver a packet");
        assert_eq!(packet.len(), 4);
    }

    #[test]
    fn resizing_producer_pool_updates_count() {
        let factory = RandomFactory::new(small_config()).unwrap();
        assert_eq!(factory.n_producer_threads(), 1);
        factory.set_n_producer_threads(3);
        assert_eq!(factory.n_producer_threads(), 3);
    }
}
