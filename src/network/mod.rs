//! Connection establishment and frame-level socket I/O.
//!
//! A [`Connection`] wraps one duplex byte channel and exposes a
//! send-one-message / receive-one-message contract built on the wire
//! protocol in [`crate::protocol`]. [`Listener`] and [`TlsListener`] own the
//! bound sockets that produce connections; the secure variants differ only
//! in how the channel is established.

pub use connection::{
    Connection, ConnectionLimits, Duplex, DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE,
};
pub use listener::{Listener, DEFAULT_BACKLOG};
pub use tls::{TlsIdentity, TlsListener, TlsSettings};

mod connection;
mod listener;
pub mod tls;
