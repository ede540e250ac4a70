use crate::protocol::checksum::{self, CRC_SIZE};
use crate::{NetError, NetResult};

/// Size, in bytes, of the fixed frame header.
pub const HEADER_SIZE: usize = 8 + CRC_SIZE;
/// Constant marker carried in the first header byte.
pub const HEADER_MARKER: u8 = 0x68;
/// Offset of the little-endian body length within the header.
pub const BODY_LENGTH_OFFSET: usize = 4;
/// Smallest legal body: a body always carries at least its own checksum.
pub const MIN_BODY_SIZE: usize = CRC_SIZE;

/// Parsed form of the 12-byte frame header.
///
/// Layout on the wire, all multi-byte fields little-endian:
/// byte 0 the marker, byte 1 reserved, bytes 2-3 unused, bytes 4-7 the body
/// length, bytes 8-11 a checksum covering bytes 0-7 only. The body carries
/// its own checksum; the header checksum lets a receiver reject a corrupted
/// length field before committing to read that many body bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub marker: u8,
    pub body_len: u32,
    pub crc: u32,
}

impl Header {
    /// Builds the header bytes for a body.
    ///
    /// The body must already carry a valid trailing checksum; it is
    /// re-validated here before any length is committed to the wire.
    pub fn build(body: &[u8]) -> NetResult<[u8; HEADER_SIZE]> {
        if !checksum::verify(body)? {
            return Err(NetError::ChecksumMismatch(
                "body must carry a valid checksum before its header is built".to_string(),
            ));
        }

        let mut header = [0u8; HEADER_SIZE];
        header[0] = HEADER_MARKER;
        header[BODY_LENGTH_OFFSET..8].copy_from_slice(&(body.len() as u32).to_le_bytes());
        let crc = checksum::compute(&header[..8]);
        header[8..].copy_from_slice(&crc.to_le_bytes());
        Ok(header)
    }

    /// Validates and parses a header.
    ///
    /// The input must be exactly [`HEADER_SIZE`] bytes, the embedded checksum
    /// must match bytes 0-7, and the body length must be large enough to hold
    /// at least the body's own checksum.
    pub fn parse(bytes: &[u8]) -> NetResult<Header> {
        if bytes.len() != HEADER_SIZE {
            return Err(NetError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        // the header checksum sits in the trailing 4 bytes, same shape as a body
        if !checksum::verify(bytes)? {
            return Err(NetError::ChecksumMismatch(
                "header checksum does not match".to_string(),
            ));
        }

        let body_len = u32::from_le_bytes(bytes[BODY_LENGTH_OFFSET..8].try_into().unwrap());
        let crc = u32::from_le_bytes(bytes[8..HEADER_SIZE].try_into().unwrap());
        if (body_len as usize) < MIN_BODY_SIZE {
            return Err(NetError::InvalidSize(body_len));
        }

        Ok(Header {
            marker: bytes[0],
            body_len,
            crc,
        })
    }
}
