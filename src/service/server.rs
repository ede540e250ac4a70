use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::network::{Connection, Listener, TlsIdentity, TlsListener, TlsSettings};
use crate::service::{ServerConfig, Shutdown};
use crate::NetResult;

/// Callback surface the embedding application supplies at construction.
///
/// The server invokes these from its accept and dispatch loops:
/// `client_connected` completes before the first `client_communicated` for
/// the same client can fire, and `client_disconnected` fires exactly once
/// when the peer goes away.
///
/// The futures carry an explicit `Send` bound so the callbacks can run
/// inside spawned tasks.
pub trait Handler: Send + Sync + 'static {
    /// A client finished connecting and is registered.
    fn client_connected(&self, client: Client) -> impl Future<Output = ()> + Send;

    /// A client delivered one validated message.
    fn client_communicated(&self, payload: Bytes, client: Client)
        -> impl Future<Output = ()> + Send;

    /// A client went away; it is no longer reachable through the server.
    fn client_disconnected(&self, client: Client) -> impl Future<Output = ()> + Send;
}

/// Cheap cloneable handle to one connected client.
#[derive(Clone)]
pub struct Client {
    id: u64,
    connection: Arc<Connection>,
}

impl Client {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.peer_addr()
    }

    /// Sends one payload to this client. Returns the bytes written,
    /// framing included.
    pub async fn send(&self, payload: &[u8]) -> NetResult<usize> {
        self.connection.send(payload).await
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peer", &self.peer_addr())
            .finish()
    }
}

struct ClientEntry {
    client: Client,
    dispatch: JoinHandle<()>,
}

enum AnyListener {
    Plain(Listener),
    Tls(TlsListener),
}

impl AnyListener {
    async fn accept(&self) -> NetResult<Connection> {
        match self {
            AnyListener::Plain(listener) => listener.accept().await,
            AnyListener::Tls(listener) => listener.accept().await,
        }
    }

    fn local_addr(&self) -> SocketAddr {
        match self {
            AnyListener::Plain(listener) => listener.local_addr(),
            AnyListener::Tls(listener) => listener.local_addr(),
        }
    }
}

struct ServerInner<H> {
    handler: H,
    // Registry of live clients. Inserted by the accept loop, removed either
    // by the owning dispatch loop (peer went away) or by remove/close
    // (server-initiated). Iteration for broadcast and teardown works on a
    // snapshot of the entries, never on the live map.
    clients: DashMap<u64, ClientEntry>,
    notify_shutdown: broadcast::Sender<()>,
    next_client_id: AtomicU64,
    closed: AtomicBool,
    local_addr: SocketAddr,
}

/// A message server over plain or TLS stream sockets.
///
/// Binding starts a dedicated accept loop; every accepted connection gets
/// its own dispatch loop decoding frames and feeding the [`Handler`].
/// Independent connections make progress independently: one blocking read
/// neither stalls acceptance nor traffic on other connections.
pub struct Server<H: Handler> {
    inner: Arc<ServerInner<H>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl<H: Handler> Server<H> {
    /// Binds a plain TCP server and starts accepting.
    ///
    /// Fails if the address cannot be bound; no partially-started server is
    /// left behind in that case.
    pub async fn bind(config: ServerConfig, handler: H) -> NetResult<Server<H>> {
        let listener =
            Listener::bind_with(&config.ip, config.port, config.backlog, config.limits()).await?;
        Ok(Self::start(AnyListener::Plain(listener), handler))
    }

    /// Binds a TLS server and starts accepting. Framing and dispatch are
    /// identical to [`bind`](Server::bind); only channel establishment
    /// differs.
    pub async fn bind_tls(
        config: ServerConfig,
        identity: TlsIdentity,
        settings: &TlsSettings,
        handler: H,
    ) -> NetResult<Server<H>> {
        let listener = TlsListener::bind_with(
            &config.ip,
            config.port,
            config.backlog,
            identity,
            settings,
            config.limits(),
        )
        .await?;
        Ok(Self::start(AnyListener::Tls(listener), handler))
    }

    fn start(listener: AnyListener, handler: H) -> Server<H> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let inner = Arc::new(ServerInner {
            handler,
            clients: DashMap::new(),
            notify_shutdown,
            next_client_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            local_addr: listener.local_addr(),
        });

        let shutdown = Shutdown::new(inner.notify_shutdown.subscribe());
        let accept_task = tokio::spawn(accept_loop(inner.clone(), listener, shutdown));
        Server {
            inner,
            accept_task: Mutex::new(Some(accept_task)),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Sends one payload to one client.
    pub async fn send(&self, payload: &[u8], client: &Client) -> NetResult<usize> {
        client.send(payload).await
    }

    /// Sends one payload to every registered client.
    ///
    /// Works on a snapshot of the registry; a delivery failure is local to
    /// that client and does not affect the others.
    pub async fn send_all(&self, payload: &[u8]) {
        let clients: Vec<Client> = self
            .inner
            .clients
            .iter()
            .map(|entry| entry.client.clone())
            .collect();
        for client in clients {
            if let Err(e) = client.send(payload).await {
                warn!(client = client.id(), error = %e, "broadcast delivery failed");
            }
        }
    }

    /// Disconnects and unregisters a client (server-initiated).
    ///
    /// Cancels the client's dispatch loop and closes its connection. The
    /// `client_disconnected` callback is reserved for peer-initiated
    /// disconnects and does not fire here.
    pub async fn remove(&self, client: &Client) -> NetResult<()> {
        remove_client(&self.inner, client.id()).await
    }

    /// Disconnects every client and stops accepting.
    ///
    /// A failure tearing down one client is reported and does not prevent
    /// teardown of the rest. Calling `close` again is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // stop the accept loop and nudge every dispatch loop
        let _ = self.inner.notify_shutdown.send(());

        let ids: Vec<u64> = self.inner.clients.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Err(e) = remove_client(&self.inner, id).await {
                warn!(client = id, error = %e, "error closing client during shutdown");
            }
        }

        if let Some(task) = self.accept_task.lock().await.take() {
            let _ = task.await;
        }
        info!("server on {} closed", self.inner.local_addr);
    }
}

impl<H: Handler> Drop for Server<H> {
    fn drop(&mut self) {
        // stops the accept and dispatch loops even without an explicit close
        let _ = self.inner.notify_shutdown.send(());
        debug!("server handle dropped");
    }
}

async fn remove_client<H: Handler>(inner: &Arc<ServerInner<H>>, id: u64) -> NetResult<()> {
    if let Some((_, entry)) = inner.clients.remove(&id) {
        // cancellation and close happen together: once the entry is out of
        // the registry, nothing may dispatch on the connection again
        entry.dispatch.abort();
        entry.client.connection().close().await?;
    }
    Ok(())
}

async fn accept_loop<H: Handler>(
    inner: Arc<ServerInner<H>>,
    listener: AnyListener,
    mut shutdown: Shutdown,
) {
    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = shutdown.recv() => {
                debug!("accept loop exiting after shutdown signal");
                break;
            }
        };

        let connection = match accepted {
            Ok(connection) => connection,
            Err(e) => {
                // a failed handshake or transient accept error must not
                // bring the server down
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };

        register(&inner, connection).await;
    }
    // the listener is dropped here, releasing the bound socket
}

async fn register<H: Handler>(inner: &Arc<ServerInner<H>>, connection: Connection) {
    let id = inner.next_client_id.fetch_add(1, Ordering::Relaxed);
    let client = Client {
        id,
        connection: Arc::new(connection),
    };
    debug!(client = id, peer = ?client.peer_addr(), "client connected");

    // The dispatch loop must not read until the registry entry exists and
    // the connected callback has completed; the gate enforces both.
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let dispatch_inner = inner.clone();
    let dispatch_client = client.clone();
    let shutdown = Shutdown::new(inner.notify_shutdown.subscribe());
    let dispatch = tokio::spawn(async move {
        if ready_rx.await.is_err() {
            return;
        }
        dispatch_loop(dispatch_inner, dispatch_client, shutdown).await;
    });

    inner.clients.insert(
        id,
        ClientEntry {
            client: client.clone(),
            dispatch,
        },
    );
    inner.handler.client_connected(client).await;
    let _ = ready_tx.send(());
}

async fn dispatch_loop<H: Handler>(inner: Arc<ServerInner<H>>, client: Client, mut shutdown: Shutdown) {
    loop {
        let received = tokio::select! {
            res = client.connection().receive() => res,
            _ = shutdown.recv() => {
                debug!(client = client.id(), "dispatch loop exiting after shutdown signal");
                return;
            }
        };

        match received {
            Ok(Some(payload)) => {
                inner
                    .handler
                    .client_communicated(payload, client.clone())
                    .await;
            }
            Ok(None) => {
                // clean end-of-stream: the one peer-initiated removal path
                debug!(client = client.id(), "client disconnected");
                unregister(&inner, &client).await;
                return;
            }
            Err(e) if e.is_data_error() => {
                // one damaged frame; the exchange failed but the
                // connection lives on
                warn!(client = client.id(), error = %e, "discarding malformed frame");
            }
            Err(e) => {
                error!(client = client.id(), error = %e, "transport failure on client connection");
                unregister(&inner, &client).await;
                return;
            }
        }
    }
}

async fn unregister<H: Handler>(inner: &Arc<ServerInner<H>>, client: &Client) {
    inner.handler.client_disconnected(client.clone()).await;
    inner.clients.remove(&client.id());
    if let Err(e) = client.connection().close().await {
        warn!(client = client.id(), error = %e, "error closing departed client");
    }
}
