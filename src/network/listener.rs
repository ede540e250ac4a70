use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::network::connection::ConnectionLimits;
use crate::network::Connection;
use crate::{NetError, NetResult};

/// Default number of fully-established connections queued for `accept`.
pub const DEFAULT_BACKLOG: u32 = 50;

/// A bound listening socket producing framed [`Connection`]s.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    local: SocketAddr,
    limits: ConnectionLimits,
}

impl Listener {
    /// Binds a listening socket to `ip:port`.
    ///
    /// `backlog` bounds the queue of established-but-not-yet-accepted
    /// connections. Binding to port 0 picks a free port, observable through
    /// [`local_addr`](Listener::local_addr).
    pub async fn bind(ip: &str, port: u16, backlog: u32) -> NetResult<Listener> {
        Self::bind_with(ip, port, backlog, ConnectionLimits::default()).await
    }

    pub async fn bind_with(
        ip: &str,
        port: u16,
        backlog: u32,
        limits: ConnectionLimits,
    ) -> NetResult<Listener> {
        let addr: SocketAddr = format!("{}:{}", ip, port)
            .parse()
            .map_err(|_| NetError::Bind(format!("invalid bind address {}:{}", ip, port)))?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| NetError::Bind(format!("cannot create socket for {}: {}", addr, e)))?;
        socket
            .bind(addr)
            .map_err(|e| NetError::Bind(format!("cannot bind to {}: {}", addr, e)))?;
        let listener = socket
            .listen(backlog)
            .map_err(|e| NetError::Bind(format!("cannot listen on {}: {}", addr, e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| NetError::Bind(format!("cannot resolve bound address: {}", e)))?;

        info!("listening on {}", local);
        Ok(Listener {
            listener,
            local,
            limits,
        })
    }

    /// Waits for and accepts one incoming connection.
    ///
    /// Safe to call repeatedly from a single accept loop; every queued peer
    /// is returned exactly once.
    pub async fn accept(&self) -> NetResult<Connection> {
        let (stream, peer) = self.accept_raw().await?;
        Ok(Connection::with_limits(stream, Some(peer), self.limits))
    }

    pub(crate) async fn accept_raw(&self) -> NetResult<(TcpStream, SocketAddr)> {
        Ok(self.listener.accept().await?)
    }

    pub(crate) fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Stops accepting and releases the listening socket.
    pub fn close(self) {
        debug!("listener on {} closed", self.local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_and_accept() -> NetResult<()> {
        let listener = Listener::bind("127.0.0.1", 0, DEFAULT_BACKLOG).await?;
        let port = listener.local_addr().port();

        let client = tokio::spawn(async move { Connection::connect("127.0.0.1", port).await });
        let accepted = listener.accept().await?;
        let client = client.await.unwrap()?;

        client.send(b"ping").await?;
        let received = accepted.receive().await?.unwrap();
        assert_eq!(&received[..], b"ping");
        Ok(())
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_address() {
        let result = Listener::bind("not an address", 0, DEFAULT_BACKLOG).await;
        assert!(matches!(result, Err(NetError::Bind(_))));
    }

    #[tokio::test]
    async fn test_bind_conflict_reported() -> NetResult<()> {
        let listener = Listener::bind("127.0.0.1", 0, DEFAULT_BACKLOG).await?;
        let port = listener.local_addr().port();
        let result = Listener::bind("127.0.0.1", port, DEFAULT_BACKLOG).await;
        assert!(matches!(result, Err(NetError::Bind(_))));
        Ok(())
    }
}
