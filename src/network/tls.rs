//! TLS-secured channel establishment.
//!
//! Framing and dispatch are identical to the plain variants; only the way
//! the duplex channel comes to exist differs. Handshake parameters (enabled
//! protocol versions and cipher suites) are supplied by the caller through
//! [`TlsSettings`]; certificate material through [`TlsIdentity`] on the
//! server side and a [`RootCertStore`] on the client side.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{
    ClientConfig, RootCertStore, ServerConfig as RustlsServerConfig, SupportedCipherSuite,
    SupportedProtocolVersion,
};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

pub use tokio_rustls::rustls;

use crate::network::connection::ConnectionLimits;
use crate::network::{Connection, Listener};
use crate::{NetError, NetResult};

/// Enabled TLS protocol versions and cipher suites.
///
/// Empty lists select the crypto provider's defaults.
#[derive(Clone, Default)]
pub struct TlsSettings {
    pub enabled_protocols: Vec<&'static SupportedProtocolVersion>,
    pub enabled_cipher_suites: Vec<SupportedCipherSuite>,
}

impl TlsSettings {
    fn provider(&self) -> CryptoProvider {
        let mut provider = ring::default_provider();
        if !self.enabled_cipher_suites.is_empty() {
            provider.cipher_suites = self.enabled_cipher_suites.clone();
        }
        provider
    }

    fn versions(&self) -> &[&'static SupportedProtocolVersion] {
        if self.enabled_protocols.is_empty() {
            rustls::ALL_VERSIONS
        } else {
            &self.enabled_protocols
        }
    }
}

/// Server certificate chain and matching private key, PEM-encoded.
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    pub fn from_pem_files(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> NetResult<TlsIdentity> {
        let cert_pem = std::fs::read(cert)?;
        let key_pem = std::fs::read(key)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> NetResult<TlsIdentity> {
        let cert_chain = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()?;
        if cert_chain.is_empty() {
            return Err(NetError::TlsConfig(
                "no certificates found in PEM input".to_string(),
            ));
        }
        let key = rustls_pemfile::private_key(&mut &key_pem[..])?
            .ok_or_else(|| NetError::TlsConfig("no private key found in PEM input".to_string()))?;
        Ok(TlsIdentity { cert_chain, key })
    }
}

/// Builds a root store from one or more PEM-encoded CA certificates.
pub fn root_store_from_pem(pem: &[u8]) -> NetResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &pem[..]) {
        roots.add(cert?)?;
    }
    if roots.is_empty() {
        return Err(NetError::TlsConfig(
            "no certificates found in PEM input".to_string(),
        ));
    }
    Ok(roots)
}

/// A bound listening socket that completes a TLS handshake on accept.
pub struct TlsListener {
    tcp: Listener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    /// Binds to `ip:port` and prepares the handshake configuration.
    pub async fn bind(
        ip: &str,
        port: u16,
        backlog: u32,
        identity: TlsIdentity,
        settings: &TlsSettings,
    ) -> NetResult<TlsListener> {
        Self::bind_with(ip, port, backlog, identity, settings, ConnectionLimits::default()).await
    }

    pub async fn bind_with(
        ip: &str,
        port: u16,
        backlog: u32,
        identity: TlsIdentity,
        settings: &TlsSettings,
        limits: ConnectionLimits,
    ) -> NetResult<TlsListener> {
        let config = RustlsServerConfig::builder_with_provider(Arc::new(settings.provider()))
            .with_protocol_versions(settings.versions())?
            .with_no_client_auth()
            .with_single_cert(identity.cert_chain, identity.key)?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let tcp = Listener::bind_with(ip, port, backlog, limits).await?;
        Ok(TlsListener { tcp, acceptor })
    }

    /// Waits for an incoming connection and completes the TLS handshake
    /// before handing the channel out.
    pub async fn accept(&self) -> NetResult<Connection> {
        let (stream, peer) = self.tcp.accept_raw().await?;
        let stream = self.acceptor.accept(stream).await?;
        debug!(peer = %peer, "tls handshake complete");
        Ok(Connection::with_limits(
            stream,
            Some(peer),
            self.tcp.limits(),
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    /// Stops accepting and releases the listening socket.
    pub fn close(self) {
        self.tcp.close();
    }
}

/// Establishes a TLS channel to `host:port`, verifying the server against
/// `roots`.
pub async fn connect(
    host: &str,
    port: u16,
    roots: RootCertStore,
    settings: &TlsSettings,
) -> NetResult<Connection> {
    let config = ClientConfig::builder_with_provider(Arc::new(settings.provider()))
        .with_protocol_versions(settings.versions())?
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let stream = TcpStream::connect((host, port)).await?;
    let peer = stream.peer_addr().ok();
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| NetError::TlsConfig(format!("invalid server name: {}", host)))?;
    let stream = connector.connect(server_name, stream).await?;
    debug!(peer = ?peer, "tls handshake complete");
    Ok(Connection::from_stream(stream, peer))
}
