use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::checksum::{self, CRC_SIZE};
use crate::protocol::header::{Header, HEADER_SIZE};
use crate::NetError::Incomplete;
use crate::{NetError, NetResult};

/// One complete header + body unit, the transmission unit of the wire
/// protocol. Each frame corresponds to exactly one application message.
#[derive(Debug)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    /// Encodes a payload into a full wire message: header, payload, payload
    /// checksum.
    pub fn encode(payload: &[u8]) -> NetResult<BytesMut> {
        if payload.len() > u32::MAX as usize - CRC_SIZE {
            return Err(NetError::FrameTooLarge {
                size: payload.len(),
                limit: u32::MAX as usize - CRC_SIZE,
            });
        }
        let body = checksum::attach(payload);
        let header = Header::build(&body)?;
        let mut message = BytesMut::with_capacity(HEADER_SIZE + body.len());
        message.extend_from_slice(&header);
        message.unsplit(body);
        Ok(message)
    }

    /// Checks whether `buffer` holds one complete, plausible frame.
    ///
    /// Peek-only. Returns `Incomplete` until enough bytes are buffered. The
    /// header is validated (checksum, length bounds) before any body byte is
    /// waited for, so a corrupted length field is rejected without committing
    /// to a bogus read.
    pub fn check(buffer: &BytesMut, max_frame_size: usize) -> NetResult<()> {
        if buffer.remaining() < HEADER_SIZE {
            return Err(Incomplete);
        }
        let header = Header::parse(&buffer[..HEADER_SIZE])?;
        let body_len = header.body_len as usize;
        if body_len > max_frame_size {
            return Err(NetError::FrameTooLarge {
                size: body_len,
                limit: max_frame_size,
            });
        }
        if buffer.remaining() < HEADER_SIZE + body_len {
            return Err(Incomplete);
        }
        Ok(())
    }

    /// Parses one frame out of `buffer`, consuming it.
    ///
    /// Returns `Ok(None)` while the buffer does not yet hold a complete
    /// frame. A frame that fails validation is consumed anyway (header-only
    /// when the header itself is bad) so a read loop advances past one
    /// damaged frame instead of re-reporting it forever.
    pub fn parse(buffer: &mut BytesMut, max_frame_size: usize) -> NetResult<Option<Frame>> {
        match Frame::check(buffer, max_frame_size) {
            Ok(()) => {}
            Err(Incomplete) => return Ok(None),
            Err(e) => {
                buffer.advance(HEADER_SIZE.min(buffer.remaining()));
                return Err(e);
            }
        }

        let header = Header::parse(&buffer[..HEADER_SIZE])?;
        buffer.advance(HEADER_SIZE);
        let body = buffer.split_to(header.body_len as usize);
        let payload = checksum::verify_and_strip(body)?;
        Ok(Some(Frame { header, payload }))
    }
}
