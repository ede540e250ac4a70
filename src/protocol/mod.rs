//! Wire-level framing for the messaging layer.
//!
//! A message on the wire is a fixed 12-byte header followed by a body of
//! `payload || payload checksum`. The header carries the body length and its
//! own checksum over the first 8 header bytes, making every frame
//! self-delimiting: a receiver learns the exact body size from a validated
//! header and never needs an end-of-message marker.
//!
//! # Components
//!
//! - [`checksum`]: CRC-32 generation, attachment, and verification
//! - [`Header`]: fixed-header build/parse with its own integrity check
//! - [`Frame`]: whole-message encode and incremental decode from a read buffer

pub use frame::Frame;
pub use header::{Header, BODY_LENGTH_OFFSET, HEADER_MARKER, HEADER_SIZE, MIN_BODY_SIZE};

pub mod checksum;
mod frame;
mod header;
