use std::fmt;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::trace;

use crate::protocol::Frame;
use crate::{NetError, NetResult};

/// Marker trait for the duplex byte channels a [`Connection`] can wrap.
/// Implemented by anything readable and writable: plain TCP streams and
/// handshaked TLS streams alike.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> Duplex for S {}

type BoxedDuplex = Box<dyn Duplex>;

/// Buffer and frame-size bounds applied to a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,
    /// Largest body a received frame may declare.
    pub max_frame_size: usize,
}

pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

impl Default for ConnectionLimits {
    fn default() -> Self {
        ConnectionLimits {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

struct FrameReader {
    reader: ReadHalf<BoxedDuplex>,
    buffer: BytesMut,
}

/// One duplex byte channel with frame-level send and receive.
///
/// Writes are serialized by an internal lock, so concurrent `send` calls
/// from several tasks cannot interleave header and body bytes. Reads are
/// strictly ordered: one frame is fully consumed before the next is
/// attempted. The channel is established at construction; after [`close`]
/// both directions report [`NetError::NotConnected`].
///
/// [`close`]: Connection::close
pub struct Connection {
    reader: Mutex<Option<FrameReader>>,
    writer: Mutex<Option<BufWriter<WriteHalf<BoxedDuplex>>>>,
    open: AtomicBool,
    peer: Option<SocketAddr>,
    limits: ConnectionLimits,
}

impl Connection {
    /// Wraps an already-established duplex channel.
    pub fn from_stream(stream: impl Duplex + 'static, peer: Option<SocketAddr>) -> Connection {
        Self::with_limits(stream, peer, ConnectionLimits::default())
    }

    pub fn with_limits(
        stream: impl Duplex + 'static,
        peer: Option<SocketAddr>,
        limits: ConnectionLimits,
    ) -> Connection {
        let (reader, writer) = tokio::io::split(Box::new(stream) as BoxedDuplex);
        Connection {
            reader: Mutex::new(Some(FrameReader {
                reader,
                buffer: BytesMut::with_capacity(limits.read_buffer_size),
            })),
            writer: Mutex::new(Some(BufWriter::new(writer))),
            open: AtomicBool::new(true),
            peer,
            limits,
        }
    }

    /// Establishes a plain TCP channel to a remote peer.
    pub async fn connect(host: &str, port: u16) -> NetResult<Connection> {
        let stream = TcpStream::connect((host, port)).await?;
        let peer = stream.peer_addr().ok();
        Ok(Self::from_stream(stream, peer))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Sends one payload as a single frame and flushes it.
    ///
    /// Returns the total number of bytes written, framing included.
    pub async fn send(&self, payload: &[u8]) -> NetResult<usize> {
        let message = Frame::encode(payload)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(NetError::NotConnected)?;
        writer.write_all(&message).await?;
        writer.flush().await?;
        trace!(bytes = message.len(), "frame written");
        Ok(message.len())
    }

    /// Receives one payload.
    ///
    /// Reads from the channel until a complete frame is buffered, validates
    /// it, and returns the payload with all framing stripped. Returns
    /// `Ok(None)` when the peer closed the channel cleanly between frames.
    /// A close in the middle of a frame is reported as a connection reset,
    /// and a frame failing validation as the matching data error; the
    /// connection stays usable after a data error.
    pub async fn receive(&self) -> NetResult<Option<Bytes>> {
        let mut guard = self.reader.lock().await;
        let state = guard.as_mut().ok_or(NetError::NotConnected)?;
        loop {
            if let Some(frame) = Frame::parse(&mut state.buffer, self.limits.max_frame_size)? {
                trace!(bytes = frame.payload.len(), "frame received");
                return Ok(Some(frame.payload));
            }
            if 0 == state.reader.read_buf(&mut state.buffer).await? {
                return if state.buffer.is_empty() {
                    // peer closed the connection between frames
                    Ok(None)
                } else {
                    // peer closed the connection while sending a frame
                    Err(
                        io::Error::new(ErrorKind::ConnectionReset, "connection reset by peer")
                            .into(),
                    )
                };
            }
        }
    }

    /// Closes both stream ends and the underlying channel.
    ///
    /// Flushes pending output and shuts the write side down. Calling `close`
    /// again is a no-op.
    pub async fn close(&self) -> NetResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            writer.shutdown().await?;
        }
        drop(guard);
        // a receive blocked on the read half keeps its lock; the half is
        // then released when the connection is dropped
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}
