//! The client half of the TCP wire protocol: connects to an
//! [`crate::AsyncTcpConsumer`] and pulls work over the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use domain::WorkItem;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::NetworkError;
use crate::wire::{Command, read_command, read_payload, write_command, write_payload};

/// Runtime configuration for a [`RemoteClient`].
#[derive(Debug, Clone)]
pub struct TcpClientConfig {
    /// Address of the server to connect to.
    pub server_addr: SocketAddr,
    /// Base delay for the exponential connect backoff.
    pub backoff_base: Duration,
    /// Upper bound on the backoff delay.
    pub backoff_cap: Duration,
    /// Connection attempts before giving up. `0` means unlimited.
    pub max_connection_attempts: u32,
    /// Consecutive `Idle` responses tolerated before disconnecting. `0` means unlimited.
    pub max_stalls: u32,
    /// How often the keep-alive ping fires.
    pub ping_interval: Duration,
    /// Unacknowledged pings tolerated before the server is declared dead and
    /// the connection is dropped.
    pub max_open_pings: u32,
}

/// Builder for [`TcpClientConfig`].
#[derive(Debug)]
pub struct TcpClientConfigBuilder {
    server_addr: SocketAddr,
    backoff_base: Duration,
    backoff_cap: Duration,
    max_connection_attempts: u32,
    max_stalls: u32,
    ping_interval: Duration,
    max_open_pings: u32,
}

impl TcpClientConfig {
    /// Create a builder targeting `server_addr`. Defaults: `backoff_base =
    /// 10 ms`, `backoff_cap = 5 s`, `max_connection_attempts = 0`
    /// (unlimited), `max_stalls = 0` (unlimited), `ping_interval = 5 s`,
    /// `max_open_pings = 3`.
    #[must_use]
    pub fn builder(server_addr: SocketAddr) -> TcpClientConfigBuilder {
        TcpClientConfigBuilder {
            server_addr,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_secs(5),
            max_connection_attempts: 0,
            max_stalls: 0,
            ping_interval: Duration::from_secs(5),
            max_open_pings: 3,
        }
    }
}

impl TcpClientConfigBuilder {
    /// Override the connect retry budget. `0` means unlimited.
    #[must_use]
    pub fn max_connection_attempts(mut self, max: u32) -> Self {
        self.max_connection_attempts = max;
        self
    }

    /// Override the consecutive-stall budget. `0` means unlimited.
    #[must_use]
    pub fn max_stalls(mut self, max: u32) -> Self {
        self.max_stalls = max;
        self
    }

    /// Override the backoff cap.
    #[must_use]
    pub fn backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Override the ping cadence.
    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Override the unacknowledged-ping cap before the server is declared dead.
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
    pub fn build(self) -> Result<TcpClientConfig, NetworkError> {
        Ok(TcpClientConfig {
            server_addr: self.server_addr,
            backoff_base: self.backoff_base,
            backoff_cap: self.backoff_cap,
            max_connection_attempts: self.max_connection_attempts,
            max_stalls: self.max_stalls,
            ping_interval: self.ping_interval,
            max_open_pings: self.max_open_pings,
        })
    }
}

/// A worker that pulls items from a remote [`crate::AsyncTcpConsumer`],
/// runs `process()` locally, and returns the result.
///
/// Unlike the server side this type owns no runtime of its own -- `run`
/// is a plain `async fn` meant to be awaited (or spawned) on whatever
/// Tokio runtime the host binary already has.
#[derive(Debug)]
pub struct RemoteClient<T> {
    config: TcpClientConfig,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> RemoteClient<T>
where
    T: WorkItem + Serialize + DeserializeOwned,
{
    /// Create a client targeting `config.server_addr`.
    #[must_use]
    pub fn new(config: TcpClientConfig) -> Self {
        Self {
            config,
            _marker: std::marker::PhantomData,
        }
    }

    /// Connect, process work until the server closes the connection or the
    /// retry/stall budgets are exhausted, then return.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::ConnectionFailed`] once
    /// `max_connection_attempts` is exhausted without a successful connect.
    pub async fn run(&self) -> Result<(), NetworkError> {
        let mut attempt: u32 = 0;
        loop {
            match TcpStream::connect(self.config.server_addr).await {
                Ok(stream) => {
                    attempt = 0;
                    if let Err(error) = self.serve_connection(stream).await {
                        tracing::debug!(%error, "connection ended, will reconnect");
                    }
                }
                Err(error) => {
                    attempt += 1;
                    tracing::warn!(%error, attempt, "failed to connect");
                    if self.config.max_connection_attempts != 0
                        && attempt >= self.config.max_connection_attempts
                    {
                        return Err(NetworkError::ConnectionFailed { attempts: attempt });
                    }
                    let delay = self
                        .config
                        .backoff_base
                        .saturating_mul(1 << attempt.min(20))
                        .min(self.config.backoff_cap);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn serve_connection(&self, stream: TcpStream) -> Result<(), NetworkError> {
        let (mut reader, writer_half) = tokio::io::split(stream);
        let writer = Arc::new(AsyncMutex::new(writer_half));
        let open_pings = Arc::new(AtomicU32::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let dead_server = Arc::new(tokio::sync::Notify::new());
        let mut stalls: u32 = 0;

        {
            let mut w = writer.lock().await;
            write_command(&mut *w, &Command::Ready).await?;
        }

        {
            let writer = Arc::clone(&writer);
            let open_pings = Arc::clone(&open_pings);
            let stop = Arc::clone(&stop);
            let dead_server = Arc::clone(&dead_server);
            let interval = self.config.ping_interval;
            let max_open_pings = self.config.max_open_pings;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    if stop.load(Ordering::Acquire) {
                        return;
                    }
                    let mut w = writer.lock().await;
                    if write_command(&mut *w, &Command::Ping).await.is_err() {
                        return;
                    }
                    drop(w);
                    let open = open_pings.fetch_add(1, Ordering::AcqRel) + 1;
                    if open > max_open_pings {
                        dead_server.notify_one();
                        return;
                    }
                }
            });
        }

        let outcome = self
            .read_loop(&mut reader, &writer, &open_pings, &dead_server, &mut stalls)
            .await;
        stop.store(true, Ordering::Release);
        outcome
    }

    async fn read_loop(
        &self,
        reader: &mut tokio::io::ReadHalf<TcpStream>,
        writer: &Arc<AsyncMutex<WriteHalf<TcpStream>>>,
        open_pings: &Arc<AtomicU32>,
        dead_server: &Arc<tokio::sync::Notify>,
        stalls: &mut u32,
    ) -> Result<(), NetworkError> {
        loop {
            let command = tokio::select! {
                biased;
                () = dead_server.notified() => {
                    tracing::warn!("server stopped answering pings, dropping connection");
                    return Err(NetworkError::PeerUnresponsive);
                }
                command = read_command(reader) => command?,
            };
            match command {
                Command::Close => return Ok(()),
                Command::Ping => {
                    let mut w = writer.lock().await;
                    write_command(&mut *w, &Command::Pong).await?;
                }
                Command::Pong => {
                    let _ = open_pings.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                        Some(v.saturating_sub(1))
                    });
                }
                Command::Idle { millis } => {
                    *stalls += 1;
                    if self.config.max_stalls != 0 && *stalls >= self.config.max_stalls {
                        return Ok(());
                    }
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    let mut w = writer.lock().await;
                    write_command(&mut *w, &Command::Ready).await?;
                }
                Command::Compute { size, .. } => {
                    *stalls = 0;
                    let bytes = read_payload(reader, size).await?;
                    let mut item: T = serde_json::from_slice(&bytes).map_err(|error| {
                        crate::error::WireError::Protocol {
                            reason: error.to_string(),
                        }
                    })?;
                    item = tokio::task::spawn_blocking(move || {
                        item.process();
                        item
                    })
                    .await
                    .map_err(|_| NetworkError::ProcessingPanicked)?;
                    let encoded = serde_json::to_vec(&item).map_err(|error| {
                        crate::error::WireError::Protocol {
                            reason: error.to_string(),
                        }
                    })?;
                    let mut w = writer.lock().await;
                    write_command(
                        &mut *w,
                        &Command::Result {
                            size: encoded.len(),
                        },
                    )
                    .await?;
                    write_payload(&mut *w, &encoded).await?;
                }
                Command::Ready | Command::Result { .. } | Command::Unknown => {
                    tracing::warn!(?command, "unexpected command from server");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RemoteClient, TcpClientConfig};
    use domain::{BufferId, ProcessingStatus, WorkItem};
    use tokio::net::TcpStream;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
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

    #[test]
    fn builder_defaults_allow_unlimited_retries_and_stalls() {
        let config = TcpClientConfig::builder("127.0.0.1:9".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(config.max_connection_attempts, 0);
        assert_eq!(config.max_stalls, 0);
    }

    #[tokio::test]
    async fn connect_failure_is_reported_after_budget_exhausted() {
        // Port 0 on loopback never accepts; the connect attempt itself fails fast.
        let config = TcpClientConfig::builder("127.0.0.1:1".parse().unwrap())
            .max_connection_attempts(2)
            .backoff_cap(std::time::Duration::from_millis(5))
            .build()
            .unwrap();
        let client: RemoteClient<Square> = RemoteClient::new(config);
        let result = client.run().await;
        assert!(matches!(
            result,
            Err(crate::error::NetworkError::ConnectionFailed { attempts: 2 })
        ));
    }

    #[tokio::test]
    async fn dead_server_is_detected_via_open_ping_cap() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accepted = tokio::spawn(async move { listener.accept().await.unwrap().0 });

        let config = TcpClientConfig::builder(addr)
            .ping_interval(std::time::Duration::from_millis(10))
            .max_open_pings(2)
            .build()
            .unwrap();
        let client: RemoteClient<Square> = RemoteClient::new(config);

        let stream = TcpStream::connect(addr).await.unwrap();
        let _peer = accepted.await.unwrap();

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(2), client.serve_connection(stream))
                .await
                .expect("watchdog should trip well before the test timeout");

        assert!(matches!(
            result,
            Err(crate::error::NetworkError::PeerUnresponsive)
        ));
    }
}
