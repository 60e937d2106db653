//! Namespaces: independent channels multiplexed over one connection.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::broadcast::BroadcastOperator;
use crate::config::ServerConfig;
use crate::conn::Connection;
use crate::error::Result;
use crate::packet::{Packet, PacketType};
use crate::room::{Adapter, AdapterFactory};
use crate::socket::{Socket, SocketRef};
use crate::types::{BoxFuture, DisconnectReason, Handshake};
use crate::value::Value;

type ConnectionFn = Arc<dyn Fn(SocketRef) -> BoxFuture<()> + Send + Sync>;

/// A named channel with its own sockets, rooms and connection callback.
///
/// Obtained from [`crate::server::Server::of`]. Clients can only connect to
/// namespaces registered this way.
///
/// ## Features
///
/// - **Connection Callback**: Set up handlers for every socket that joins
/// - **Socket Lookup**: Find connected sockets by id
/// - **Broadcasting**: Emit to every socket or to selected rooms
pub struct Namespace {
    /// Exact name clients use in their packets, such as `/` or `/chat`.
    name: String,

    config: Arc<ServerConfig>,

    /// Room membership and broadcast fan-out for this namespace.
    adapter: Arc<dyn Adapter>,

    /// Connected sockets keyed by socket id.
    sockets: RwLock<HashMap<String, SocketRef>>,

    on_connection: parking_lot::RwLock<Option<ConnectionFn>>,
}

impl Namespace {
    pub(crate) fn new(
        name: impl Into<String>,
        config: Arc<ServerConfig>,
        adapter: &AdapterFactory,
    ) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|nsp| Self {
            name,
            config,
            adapter: adapter(nsp.clone()),
            sockets: RwLock::new(HashMap::new()),
            on_connection: parking_lot::RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Sets the callback run for every socket that connects to this
    /// namespace, replacing any previous one.
    ///
    /// The connection reads no further packets until the callback returns, so
    /// handlers registered inside it see every later event from the client.
    pub fn on_connection<F, Fut>(&self, callback: F)
    where
        F: Fn(SocketRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ConnectionFn =
            Arc::new(move |socket: SocketRef| -> BoxFuture<()> { Box::pin(callback(socket)) });
        *self.on_connection.write() = Some(callback);
    }

    pub async fn socket(&self, sid: &str) -> Option<SocketRef> {
        self.sockets.read().await.get(sid).cloned()
    }

    pub async fn sockets(&self) -> Vec<SocketRef> {
        self.sockets.read().await.values().cloned().collect()
    }

    pub async fn socket_count(&self) -> usize {
        self.sockets.read().await.len()
    }

    /// Sockets for the given ids; unknown ids are skipped.
    pub async fn sockets_by_id(&self, sids: &[String]) -> Vec<SocketRef> {
        let sockets = self.sockets.read().await;
        sids.iter().filter_map(|sid| sockets.get(sid).cloned()).collect()
    }

    /// Broadcast to the members of `rooms`.
    pub fn to<I>(self: &Arc<Self>, rooms: I) -> BroadcastOperator
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        BroadcastOperator::new(Arc::clone(self)).to(rooms)
    }

    /// Broadcast to every socket of the namespace.
    pub fn broadcast(self: &Arc<Self>) -> BroadcastOperator {
        BroadcastOperator::new(Arc::clone(self))
    }

    /// Sends an event to every socket of the namespace.
    pub async fn emit<I>(self: &Arc<Self>, event: &str, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.broadcast().emit(event, args).await
    }

    /// Creates the socket for a CONNECT, runs the connection callback and
    /// joins the socket to its own id room.
    pub(crate) async fn connect(
        self: &Arc<Self>,
        sid: String,
        conn: Arc<Connection>,
        auth: Option<&Value>,
    ) -> SocketRef {
        let socket = Socket::new(sid, Arc::clone(self), Arc::clone(&conn), Handshake::from_payload(auth));
        conn.attach(&self.name, &socket);
        self.sockets
            .write()
            .await
            .insert(socket.id().to_owned(), Arc::clone(&socket));

        let callback = self.on_connection.read().clone();
        if let Some(callback) = callback {
            callback(Arc::clone(&socket)).await;
        }

        self.adapter
            .join(socket.id(), &[socket.id().to_owned()])
            .await;
        // Disconnected during the callback: undo the join its teardown missed.
        if !socket.connected() {
            self.adapter.leave_all(socket.id()).await;
        }
        socket
    }

    /// Forgets a socket and drops all of its room memberships.
    pub(crate) async fn remove(&self, sid: &str) {
        self.sockets.write().await.remove(sid);
        self.adapter.leave_all(sid).await;
    }

    /// Routes a packet received for socket `sid`.
    pub async fn dispatch(&self, sid: &str, packet: Packet) {
        let Some(socket) = self.socket(sid).await else {
            warn!(namespace = %self.name, sid, "packet for unknown socket dropped");
            return;
        };

        match packet.kind {
            PacketType::Disconnect => {
                socket
                    .close(DisconnectReason::ClientNamespaceDisconnect, false)
                    .await;
            }
            PacketType::Event | PacketType::BinaryEvent => socket.dispatch_event(packet).await,
            kind => debug!(namespace = %self.name, sid, ?kind, "ignoring client packet"),
        }
    }
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
