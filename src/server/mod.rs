//! The server: namespace registry, connection acceptor and WebSocket listener.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::namespace::Namespace;
use crate::room::{AdapterFactory, InMemoryAdapter};
use crate::transport::{Session, WsSession};

struct Inner {
    config: Arc<ServerConfig>,
    adapter: AdapterFactory,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    /// Flipped to `true` by [`Server::close`] to stop accept loops.
    closed: watch::Sender<bool>,
}

/// Entry point of the library. Cheap to clone; clones share all state.
///
/// Namespaces, `/` included, exist only once registered with
/// [`of`](Self::of). A CONNECT for a name that was never registered is
/// answered with CONNECT_ERROR.
///
/// ## Example
///
/// ```rust,no_run
/// use wynd_io::event::Signature;
/// use wynd_io::server::Server;
///
/// #[tokio::main]
/// async fn main() {
///     let server = Server::new();
///
///     server.of("/").on_connection(|socket| async move {
///         socket.on("ping", Signature::empty(), |socket, _, _| async move {
///             let _ = socket.emit("pong", Vec::<String>::new()).await;
///         });
///     });
///
///     server
///         .listen(3000, || println!("listening on ws://localhost:3000"))
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the namespace called `name`, creating it on first use.
    pub fn of(&self, name: &str) -> Arc<Namespace> {
        if let Some(nsp) = self.namespace(name) {
            return nsp;
        }
        let mut namespaces = self.inner.namespaces.write();
        let nsp = namespaces.entry(name.to_owned()).or_insert_with(|| {
            debug!(namespace = name, "namespace created");
            Namespace::new(name, Arc::clone(&self.inner.config), &self.inner.adapter)
        });
        Arc::clone(nsp)
    }

    /// Looks up an existing namespace without creating it.
    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.inner.namespaces.read().get(name).cloned()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.inner.namespaces.read().keys().cloned().collect()
    }

    /// Serves one transport session on its own task.
    ///
    /// The task ends when the session does; awaiting the handle is optional.
    pub fn accept<S: Session>(&self, session: S) -> JoinHandle<()> {
        let conn = Connection::new(Arc::new(session), self.clone());
        debug!(session = conn.id(), "session accepted");
        tokio::spawn(conn.run())
    }

    /// Completes the WebSocket handshake on `stream` and serves it.
    pub async fn accept_stream<T>(&self, stream: T, addr: Option<SocketAddr>) -> Result<JoinHandle<()>>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static,
    {
        let websocket = accept_async_with_config(stream, Some(self.websocket_config()))
            .await
            .map_err(crate::transport::TransportError::from)?;
        Ok(self.accept(WsSession::new(websocket, addr)))
    }

    /// Binds `0.0.0.0:port`, calls `on_ready`, then accepts connections until
    /// the server is closed or the listener fails.
    pub async fn listen<F: FnOnce()>(&self, port: u16, on_ready: F) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        on_ready();
        self.serve(listener).await
    }

    /// Accepts connections from an already bound listener.
    ///
    /// Returns `Ok(())` once [`close`](Self::close) is called. The listener is
    /// dropped then; connections already accepted keep running.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "server listening");
        let mut closed = self.inner.closed.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = async { closed.wait_for(|closed| *closed).await.map(|_| ()) } => {
                    info!("server closed, no longer accepting");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };
            let (stream, addr) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return Err(Error::Io(e));
                }
            };

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.accept_stream(stream, Some(addr)).await {
                    warn!(%addr, error = %e, "websocket handshake failed");
                }
            });
        }
    }

    /// Stops every running [`serve`](Self::serve) loop, and any started later.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .max_message_size(Some(self.inner.config.max_payload))
            .max_frame_size(Some(self.inner.config.max_payload))
    }
}

impl Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.inner.config)
            .field("namespaces", &self.namespaces())
            .finish_non_exhaustive()
    }
}

/// Configures a [`Server`] before any namespace exists.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    adapter: Option<AdapterFactory>,
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the in-memory adapter for every namespace.
    pub fn adapter(mut self, factory: AdapterFactory) -> Self {
        self.adapter = Some(factory);
        self
    }

    pub fn build(self) -> Server {
        let (closed, _) = watch::channel(false);
        Server {
            inner: Arc::new(Inner {
                config: Arc::new(self.config),
                adapter: self.adapter.unwrap_or_else(InMemoryAdapter::factory),
                namespaces: RwLock::new(HashMap::new()),
                closed,
            }),
        }
    }
}
