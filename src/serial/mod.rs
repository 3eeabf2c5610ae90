//! # Serial Module
//!
//! Raw serial device access built from small parts:
//!
//! - [`baud`]: bit rate to line-speed lookup
//! - [`fd`]: single-owner descriptor guard
//! - [`cancel`]: wake channel used to stop the reader
//! - [`config`]: device open and raw-mode setup
//! - [`reader`]: background reader thread
//! - [`write`]: full-buffer transmit
//! - [`port`]: [`SerialLink`], the push-model facade
//! - [`device`]: [`SerialDevice`], the polling alternative
//! - [`encoding`]: rendering of received bytes

pub mod baud;
pub mod cancel;
pub mod config;
pub mod data;
pub mod device;
pub mod encoding;
pub mod fd;
pub mod port;
pub mod reader;
pub mod write;

pub use baud::COMMON_BAUD_RATES;
pub use config::LinkSettings;
pub use data::{DisconnectReason, LinkEvent, LinkSink};
pub use device::SerialDevice;
pub use port::SerialLink;
