//! Asynchronous TCP consumer: the `"ws"` mnemonic.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use domain::{SubstrateError, WorkItem};
use geneva_broker::{Broker, ConsumerHandle};
use geneva_consumer::Consumer;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::NetworkError;
use crate::wire::{Command, SerializationMode, read_command, read_payload, write_command, write_payload};

/// Mnemonic of [`AsyncTcpConsumer`], used by the broker to reject duplicates.
pub const TCP_CONSUMER_MNEMONIC: &str = "ws";

/// Runtime configuration for an [`AsyncTcpConsumer`].
#[derive(Debug, Clone)]
pub struct TcpConsumerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Serialization mode advertised with each `compute` frame.
    pub serialization_mode: SerializationMode,
    /// Sleep suggested to a client when no work is available.
    pub idle_sleep: Duration,
    /// Per-attempt deadline for pulling a raw item off the broker.
    pub poll_timeout: Duration,
    /// Per-attempt deadline for returning a processed item to the broker.
    pub put_timeout: Duration,
    /// How often each session sends a keep-alive ping.
    pub ping_interval: Duration,
    /// Unacknowledged pings tolerated before a session is dropped.
    pub max_open_pings: u32,
}

/// Builder for [`TcpConsumerConfig`].
#[derive(Debug)]
pub struct TcpConsumerConfigBuilder {
    bind_addr: SocketAddr,
    serialization_mode: SerializationMode,
    idle_sleep: Duration,
    poll_timeout: Duration,
    put_timeout: Duration,
    ping_interval: Duration,
    max_open_pings: u32,
}

impl TcpConsumerConfig {
    /// Create a builder bound to `bind_addr`. Defaults: `serialization_mode
    /// = Text`, `idle_sleep = 200 ms`, `poll_timeout = 200 ms`,
    /// `put_timeout = 1 s`, `ping_interval = 5 s`, `max_open_pings = 3`.
    #[must_use]
    pub fn builder(bind_addr: SocketAddr) -> TcpConsumerConfigBuilder {
        TcpConsumerConfigBuilder {
            bind_addr,
            serialization_mode: SerializationMode::Text,
            idle_sleep: Duration::from_millis(200),
            poll_timeout: Duration::from_millis(200),
            put_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(5),
            max_open_pings: 3,
        }
    }
}

impl TcpConsumerConfigBuilder {
    /// Override the advertised serialization mode.
    #[must_use]
    pub fn serialization_mode(mut self, mode: SerializationMode) -> Self {
        self.serialization_mode = mode;
        self
    }

    /// Override the idle-sleep suggestion sent to an out-of-work client.
    #[must_use]
    pub fn idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }

    /// Override the ping cadence.
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Override the unacknowledged-ping cap before a session is dropped.
    #[must_use]
    pub fn max_open_pings(mut self, max: u32) -> Self {
        self.max_open_pings = max;
        self
    }

    /// Finalize the configuration.
    ///
    /// # Errors
    ///
    /// Infallible today; returns `Result` to match its sibling builders.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<TcpConsumerConfig, NetworkError> {
        Ok(TcpConsumerConfig {
            bind_addr: self.bind_addr,
            serialization_mode: self.serialization_mode,
            idle_sleep: self.idle_sleep,
            poll_timeout: self.poll_timeout,
            put_timeout: self.put_timeout,
            ping_interval: self.ping_interval,
            max_open_pings: self.max_open_pings,
        })
    }
}

struct Inner<T> {
    broker: Arc<Broker<T>>,
    config: TcpConsumerConfig,
    shutdown: AtomicBool,
}

/// Consumer that serves work over TCP to one or more [`RemoteClient`](crate::RemoteClient)s.
///
/// Drives its own multi-threaded Tokio runtime on a dedicated OS thread, so
/// [`async_start_processing`](ConsumerHandle::async_start_processing) stays
/// non-blocking the way the broker's enrollment path requires. Unlike
/// [`geneva_consumer::ThreadPoolConsumer`], this consumer is not capable of
/// full return: a client that disconnects mid-item takes that item with it.
pub struct AsyncTcpConsumer<T> {
    inner: Arc<Inner<T>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<T> std::fmt::Debug for AsyncTcpConsumer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTcpConsumer")
            .field("bind_addr", &self.inner.config.bind_addr)
            .finish()
    }
}

impl<T> AsyncTcpConsumer<T>
where
    T: WorkItem + Serialize + DeserializeOwned,
{
    /// Create a consumer bound to `broker`. Call
    /// [`async_start_processing`](ConsumerHandle::async_start_processing)
    /// (typically via [`Broker::enrol_consumer`]) to launch its listener.
    #[must_use]
    pub fn new(broker: Arc<Broker<T>>, config: TcpConsumerConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                broker,
                config,
                shutdown: AtomicBool::new(false),
            }),
            driver: Mutex::new(None),
        })
    }

    async fn accept_loop(inner: Arc<Inner<T>>) {
        let listener = match tokio::net::TcpListener::bind(inner.config.bind_addr).await {
            Ok(listener) => listener,
            Err(error) => {
                tracing::error!(%error, addr = %inner.config.bind_addr, "failed to bind TCP consumer");
                return;
            }
        };
        tracing::info!(addr = %inner.config.bind_addr, "TCP consumer listening");
        loop {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            match tokio::time::timeout(Duration::from_millis(200), listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    let session_inner = Arc::clone(&inner);
                    tokio::spawn(async move { Self::session(stream, peer, session_inner).await });
                }
                Ok(Err(error)) => tracing::warn!(%error, "accept failed"),
                Err(_elapsed) => {}
            }
        }
    }

    async fn session(stream: TcpStream, peer: SocketAddr, inner: Arc<Inner<T>>) {
        let (mut reader, writer_half) = tokio::io::split(stream);
        let writer = Arc::new(AsyncMutex::new(writer_half));
        let open_pings = Arc::new(AtomicU32::new(0));
        let session_shutdown = Arc::new(AtomicBool::new(false));

        {
            let writer = Arc::clone(&writer);
            let open_pings = Arc::clone(&open_pings);
            let session_shutdown = Arc::clone(&session_shutdown);
            let interval = inner.config.ping_interval;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    if session_shutdown.load(Ordering::Acquire) {
                        return;
                    }
                    let mut w = writer.lock().await;
                    if write_command(&mut *w, &Command::Ping).await.is_err() {
                        return;
                    }
                    open_pings.fetch_add(1, Ordering::AcqRel);
                }
            });
        }

        let outcome: Result<(), NetworkError> = async {
            loop {
                if inner.shutdown.load(Ordering::Acquire) {
                    let mut w = writer.lock().await;
                    write_command(&mut *w, &Command::Close).await?;
                    return Ok(());
                }
                if open_pings.load(Ordering::Acquire) > inner.config.max_open_pings {
                    tracing::warn!(%peer, "client stopped answering pings, dropping session");
                    return Err(NetworkError::PeerUnresponsive);
                }

                let command = read_command(&mut reader).await?;
                match command {
                    Command::Ping => {
                        let mut w = writer.lock().await;
                        write_command(&mut *w, &Command::Pong).await?;
                    }
                    Command::Pong => {
                        let _ = open_pings.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                            Some(v.saturating_sub(1))
                        });
                    }
                    Command::Result { size } => {
                        let bytes = read_payload(&mut reader, size).await?;
                        Self::accept_result(&inner, &bytes).await;
                        Self::offer_work(&writer, &inner).await?;
                    }
                    Command::Ready => {
                        Self::offer_work(&writer, &inner).await?;
                    }
                    Command::Close | Command::Compute { .. } | Command::Idle { .. } | Command::Unknown => {
                        tracing::warn!(%peer, ?command, "unexpected command from client");
                    }
                }
            }
        }
        .await;

        session_shutdown.store(true, Ordering::Release);
        if let Err(error) = outcome {
            tracing::debug!(%peer, %error, "session ended");
        }
    }

    async fn accept_result(inner: &Arc<Inner<T>>, bytes: &[u8]) {
        let item: T = match serde_json::from_slice(bytes) {
            Ok(item) => item,
            Err(error) => {
                tracing::warn!(%error, "malformed result payload, discarding");
                return;
            }
        };
        let Some(id) = item.buffer_id() else {
            tracing::warn!("result payload carries no buffer id, discarding");
            return;
        };
        let broker = Arc::clone(&inner.broker);
        let put_timeout = inner.config.put_timeout;
        match tokio::task::spawn_blocking(move || broker.put(id, item, put_timeout)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(port_id = %id, %error, "broker rejected returned item"),
            Err(error) => tracing::error!(%error, "put task panicked"),
        }
    }

    async fn offer_work(
        writer: &Arc<AsyncMutex<WriteHalf<TcpStream>>>,
        inner: &Arc<Inner<T>>,
    ) -> Result<(), NetworkError> {
        let broker = Arc::clone(&inner.broker);
        let poll_timeout = inner.config.poll_timeout;
        let outcome = tokio::task::spawn_blocking(move || broker.get(poll_timeout))
            .await
            .map_err(|_| NetworkError::ProcessingPanicked)?;
        let mut w = writer.lock().await;
        match outcome {
            Ok((_, item)) => match serde_json::to_vec(&item) {
                Ok(bytes) => {
                    write_command(
                        &mut *w,
                        &Command::Compute {
                            size: bytes.len(),
                            mode: inner.config.serialization_mode,
                        },
                    )
                    .await?;
                    write_payload(&mut *w, &bytes).await?;
                }
                Err(error) => tracing::error!(%error, "failed to encode work item"),
            },
            Err(SubstrateError::Timeout) => {
                write_command(
                    &mut *w,
                    &Command::Idle {
                        millis: u64::try_from(inner.config.idle_sleep.as_millis()).unwrap_or(u64::MAX),
                    },
                )
                .await?;
            }
            Err(SubstrateError::Shutdown) => {
                write_command(&mut *w, &Command::Close).await?;
            }
            Err(error) => tracing::error!(%error, "unexpected broker error on pickup"),
        }
        Ok(())
    }
}

impl<T> ConsumerHandle for AsyncTcpConsumer<T>
where
    T: WorkItem + Serialize + DeserializeOwned,
{
    fn mnemonic(&self) -> &'static str {
        TCP_CONSUMER_MNEMONIC
    }

    fn async_start_processing(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build TCP consumer runtime");
            runtime.block_on(Self::accept_loop(inner));
        });
        *self.driver.lock() = Some(handle);
    }

    fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.driver.lock().take() {
            let _ = handle.join();
        }
    }
}

impl<T> Consumer for AsyncTcpConsumer<T>
where
    T: WorkItem + Serialize + DeserializeOwned,
{
    fn capable_of_full_return(&self) -> bool {
        false
    }

    fn n_processing_units_estimate(&self) -> (usize, bool) {
        // Clients attach and detach freely; this is a guess, not a guarantee.
        (1, false)
    }
}
