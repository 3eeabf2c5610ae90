//! # Serial Link
//!
//! Raw binary access to POSIX serial devices.
//!
//! This crate opens a character device in raw 8N1 mode, transmits complete
//! buffers, and hands received bytes to a consumer from a background thread
//! that can be stopped promptly at any time.
//!
//! ## Features
//!
//! - **Raw device setup**: non-blocking, close-on-exec, no controlling
//!   terminal, no flow control, stale queues flushed before use.
//! - **Push delivery**: [`SerialLink`](serial::SerialLink) forwards chunks and a
//!   terminal disconnect status through a [`LinkSink`](serial::LinkSink),
//!   e.g. a Tokio channel.
//! - **Polling delivery**: [`SerialDevice`](serial::SerialDevice) offers
//!   `read_some` with a timeout for callers that prefer to pull.
//!
//! ## Architecture
//!
//! - [`serial`]: device configuration, reader thread, write path and facades
//! - [`error`]: error types for the crate

pub mod error;
pub mod serial;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::error::*;
    pub use crate::serial::{
        DisconnectReason, LinkEvent, LinkSettings, LinkSink, SerialDevice, SerialLink,
    };
}
