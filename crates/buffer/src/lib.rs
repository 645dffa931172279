//! Capacity-bounded FIFOs and the raw/processed port pair built from them.
//!
//! [`BoundedBuffer`] is the single condition-variable-guarded queue used
//! throughout the substrate. [`BufferPort`] pairs two of them under one
//! identity and is the unit the broker enrolls and routes work through.

mod bounded;
mod error;
mod port;

pub use bounded::{BoundedBuffer, DEFAULT_BUFFER_CAPACITY};
pub use error::BufferError;
pub use port::BufferPort;
