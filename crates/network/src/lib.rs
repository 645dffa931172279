//! TCP transport for the evaluation substrate: a consumer that serves work
//! to remote clients, and the client that connects to it.
//!
//! Both sides speak the same fixed-width command protocol (see [`wire`]),
//! so a [`RemoteClient`] can just as well talk to a server written in any
//! language that implements the same framing.

mod error;
mod tcp_client;
mod tcp_consumer;
mod wire;

pub use error::{NetworkError, WireError};
pub use tcp_client::{RemoteClient, TcpClientConfig, TcpClientConfigBuilder};
pub use tcp_consumer::{AsyncTcpConsumer, TcpConsumerConfig, TcpConsumerConfigBuilder, TCP_CONSUMER_MNEMONIC};
pub use wire::{read_command, read_payload, write_command, write_payload, Command, SerializationMode, COMMAND_LENGTH};
