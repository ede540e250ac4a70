mod network;
mod protocol;
mod service;

pub use network::tls;
pub use network::{
    Connection, ConnectionLimits, Duplex, Listener, TlsIdentity, TlsListener, TlsSettings,
    DEFAULT_BACKLOG, DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE,
};
pub use protocol::{checksum, Frame, Header, HEADER_MARKER, HEADER_SIZE};
pub use service::{
    setup_local_tracing, setup_tracing, Client, Handler, NetError, NetResult, Server, ServerConfig,
    Shutdown,
};
