use bytes::{BufMut, Bytes, BytesMut};

use crate::{NetError, NetResult};

/// Size, in bytes, of an encoded checksum.
pub const CRC_SIZE: usize = 4;

/// Computes the CRC-32 of a byte slice.
///
/// Deterministic for a given input. This is an integrity code, not a
/// cryptographic digest; it detects accidental corruption only.
pub fn compute(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Appends a little-endian 4-byte checksum to `payload`, producing a body.
///
/// Defined for payloads of any length, including zero.
pub fn attach(payload: &[u8]) -> BytesMut {
    let mut body = BytesMut::with_capacity(payload.len() + CRC_SIZE);
    body.put_slice(payload);
    body.put_u32_le(compute(payload));
    body
}

/// Checks the trailing checksum of a body against a fresh one computed over
/// the leading bytes. The body is left unmodified.
pub fn verify(body: &[u8]) -> NetResult<bool> {
    if body.len() < CRC_SIZE {
        return Err(NetError::TooShort {
            expected: CRC_SIZE,
            actual: body.len(),
        });
    }
    let (payload, trailer) = body.split_at(body.len() - CRC_SIZE);
    let embedded = u32::from_le_bytes(trailer.try_into().unwrap());
    Ok(embedded == compute(payload))
}

/// Checks the trailing checksum of a body and returns the payload without it.
pub fn verify_and_strip(mut body: BytesMut) -> NetResult<Bytes> {
    if !verify(&body)? {
        let (payload, trailer) = body.split_at(body.len() - CRC_SIZE);
        let embedded = u32::from_le_bytes(trailer.try_into().unwrap());
        return Err(NetError::ChecksumMismatch(format!(
            "body checksum {:#010x} does not match computed {:#010x}",
            embedded,
            compute(payload)
        )));
    }
    body.truncate(body.len() - CRC_SIZE);
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_known_value() {
        // reference value for the IEEE polynomial
        assert_eq!(compute(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute(b""), 0);
    }

    #[test]
    fn test_deterministic() {
        let data = b"the quick brown fox";
        assert_eq!(compute(data), compute(data));
    }

    #[test]
    fn test_sensitivity() {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        rng.fill_bytes(&mut a);
        rng.fill_bytes(&mut b);
        if a != b {
            assert_ne!(compute(&a), compute(&b));
        }
    }

    #[rstest]
    #[case(&b""[..])]
    #[case(&b"h"[..])]
    #[case(&b"Hello, world!"[..])]
    #[case(&[0u8; 1024][..])]
    fn test_attach_strip_round_trip(#[case] payload: &[u8]) {
        let body = attach(payload);
        assert_eq!(body.len(), payload.len() + CRC_SIZE);
        let stripped = verify_and_strip(body).unwrap();
        assert_eq!(&stripped[..], payload);
    }

    #[test]
    fn test_verify_too_short() {
        let result = verify(&[0u8; 3]);
        assert!(matches!(result, Err(NetError::TooShort { .. })));
    }

    #[test]
    fn test_corruption_detected() {
        let mut body = attach(b"some payload bytes");
        body[3] ^= 0x01;
        assert!(!verify(&body).unwrap());
        let result = verify_and_strip(body);
        assert!(matches!(result, Err(NetError::ChecksumMismatch(_))));
    }

    #[test]
    fn test_checksum_byte_corruption_detected() {
        let mut body = attach(b"some payload bytes");
        let last = body.len() - 1;
        body[last] ^= 0x80;
        assert!(!verify(&body).unwrap());
    }
}
