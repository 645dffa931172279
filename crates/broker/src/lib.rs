//! Process-wide multiplexer between producer-owned buffer ports and
//! registered consumers.
//!
//! [`Broker`] is the fair, thread-safe rendezvous point: producers enroll a
//! [`geneva_buffer::BufferPort`] and submit work into it; consumers enroll
//! themselves and pull work round-robin across every enrolled port.

mod broker;
mod consumer_handle;

pub use broker::Broker;
pub use consumer_handle::ConsumerHandle;
