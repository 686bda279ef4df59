//! # Relay Path Decoding
//!
//! MeshCore radios report every packet they hear as "RX log" data: a small header
//! followed by the relay path the packet took. This module turns that untrusted
//! payload into a [`PathRecord`] and renders it for the ping reply.
//!
//! ## Wire shape
//!
//! ```text
//! offset 0      1          2 .. 2+n
//!        ┌──────┬──────────┬──────────────────────┐
//!        │ hdr  │ hop cnt n│ n × 1‑byte node ids  │ …rest ignored
//!        └──────┴──────────┴──────────────────────┘
//! ```
//!
//! The payload may arrive as raw bytes, as hex text, or wrapped in the JSON record
//! the client emits for RX log events (`{"snr": .., "rssi": .., "payload": "<hex>"}`).
//!
//! Decoding never fails loudly: anything that cannot be read yields `None` and the
//! formatter substitutes the unknown placeholder.
//!
//! ```rust
//! use meshpong::path::{decode, format_path, RawPayload};
//!
//! let record = decode(&RawPayload::from("00023f01ff"));
//! assert_eq!(
//!     format_path(record.as_ref(), "Meisterschwanden"),
//!     "(2 hops nach Meisterschwanden, 3f:01)"
//! );
//! ```

mod decode;
mod format;

pub use decode::decode;
pub use format::{format_path, DIRECT_PATH, UNKNOWN_PATH};

use serde_json::Value;

/// Field of an RX log record that carries the raw packet.
pub const PAYLOAD_FIELD: &str = "payload";

/// Untrusted input handed to the decoder.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawPayload {
    /// Nothing was delivered with the event.
    #[default]
    Absent,
    Bytes(Vec<u8>),
    /// Hex encoding of the bytes, any case, surrounding whitespace allowed.
    Hex(String),
    /// Container exposing the payload under [`PAYLOAD_FIELD`].
    Record(Value),
}

impl From<&str> for RawPayload {
    fn from(s: &str) -> Self {
        RawPayload::Hex(s.to_string())
    }
}

impl From<String> for RawPayload {
    fn from(s: String) -> Self {
        RawPayload::Hex(s)
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(b: Vec<u8>) -> Self {
        RawPayload::Bytes(b)
    }
}

impl From<&[u8]> for RawPayload {
    fn from(b: &[u8]) -> Self {
        RawPayload::Bytes(b.to_vec())
    }
}

impl From<Value> for RawPayload {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => RawPayload::Absent,
            other => RawPayload::Record(other),
        }
    }
}

impl<T: Into<RawPayload>> From<Option<T>> for RawPayload {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

/// Relay path decoded from one RX log packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    /// Declared number of relay hops (0 = heard directly).
    pub hop_count: u8,
    /// Node ids actually present; shorter than `hop_count` when the packet was cut off.
    pub nodes: Vec<u8>,
}

impl PathRecord {
    pub fn is_direct(&self) -> bool {
        self.hop_count == 0
    }

    /// True when fewer node ids were available than the hop count announced.
    pub fn is_partial(&self) -> bool {
        self.nodes.len() < usize::from(self.hop_count)
    }
}
