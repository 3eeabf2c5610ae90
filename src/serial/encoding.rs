//! # Encoding Module
//!
//! Rendering of received chunks and parsing of typed input for the console
//! monitor. Bytes are shown as they arrive; no framing is applied.

use std::fmt;

use clap::ValueEnum;
use log::error;
use regex::Regex;

/// display and input format for link bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DataType {
    /// hex data
    Hex,
    /// utf8 data
    #[default]
    Utf8,
    /// binary data
    Binary,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Hex => write!(f, "Hex"),
            DataType::Utf8 => write!(f, "UTF-8"),
            DataType::Binary => write!(f, "Binary"),
        }
    }
}

/// Encodes typed input to bytes for transmission.
///
/// # Examples
///
/// ```
/// use serial_link::serial::encoding::{encode_string, DataType};
///
/// let bytes = encode_string("48 65 6C 6C 6F", DataType::Hex);
/// assert_eq!(bytes, b"Hello");
///
/// let bytes = encode_string("Hello", DataType::Utf8);
/// assert_eq!(bytes, b"Hello");
/// ```
#[must_use]
pub fn encode_string(source_data: &str, data_type: DataType) -> Vec<u8> {
    match data_type {
        DataType::Hex => encode_hex(source_data),
        DataType::Utf8 | DataType::Binary => source_data.as_bytes().to_vec(),
    }
}

/// Renders received bytes for display.
///
/// # Examples
///
/// ```
/// use serial_link::serial::encoding::{decode_bytes, DataType};
///
/// assert_eq!(decode_bytes(b"Hello", DataType::Hex), "48 65 6c 6c 6f");
/// assert_eq!(decode_bytes(b"Hello", DataType::Utf8), "Hello");
/// ```
#[must_use]
pub fn decode_bytes(source_data: &[u8], data_type: DataType) -> String {
    match data_type {
        DataType::Hex => source_data
            .iter()
            .map(|b| hex::encode([*b]))
            .collect::<Vec<_>>()
            .join(" "),
        DataType::Utf8 => String::from_utf8_lossy(source_data).into_owned(),
        DataType::Binary => source_data
            .iter()
            .map(|b| format!("{b:08b}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Strips everything but hex digits and pads an odd-length string with a
/// leading zero.
fn encode_hex(source_data: &str) -> Vec<u8> {
    let re = match Regex::new(r"[^0-9a-fA-F]") {
        Ok(re) => re,
        Err(err) => {
            error!("Hex pattern error: {err}");
            return Vec::new();
        }
    };
    let hex_str = re.replace_all(source_data, "");

    let cleaned_hex = if hex_str.len() % 2 != 0 {
        format!("0{hex_str}")
    } else {
        hex_str.to_string()
    };

    match hex::decode(&cleaned_hex) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Hex encoding error: {err}");
            Vec::new()
        }
    }
}
