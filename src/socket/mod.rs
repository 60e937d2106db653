//! Per-namespace client sockets.
//!
//! A [`Socket`] is created when a client sends CONNECT for a namespace and
//! lives until that namespace is disconnected, by either side, or the
//! transport goes away. Handlers receive it as a [`SocketRef`].

use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::broadcast::BroadcastOperator;
use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::event::{AckSender, Args, EventRegistry, Signature};
use crate::namespace::Namespace;
use crate::packet::Packet;
use crate::types::{BoxFuture, DisconnectReason, Extensions, Handshake};
use crate::value::Value;

/// Shared handle to a [`Socket`].
pub type SocketRef = Arc<Socket>;

type DisconnectFn = Box<dyn FnOnce(SocketRef, DisconnectReason) -> BoxFuture<()> + Send>;

/// A client's presence in one namespace.
///
/// ## Features
///
/// - **Events**: Register typed handlers with [`on`](Self::on) and send with [`emit`](Self::emit)
/// - **Acknowledgements**: Handlers that declare an ack can answer the client
/// - **Rooms**: Join and leave rooms, or broadcast to them with [`to`](Self::to)
/// - **Lifecycle**: One disconnect callback, run exactly once
///
/// ## Example
///
/// ```rust,no_run
/// use wynd_io::event::{ArgKind, Signature};
/// use wynd_io::server::Server;
///
/// let server = Server::new();
/// server.of("/").on_connection(|socket| async move {
///     socket.on("hello", Signature::new([ArgKind::String]), |socket, args, _| async move {
///         let name = args.str(0).unwrap_or("stranger").to_owned();
///         let _ = socket.emit("welcome", [name]).await;
///     });
///
///     socket.on_disconnect(|socket, reason| async move {
///         println!("{} left: {}", socket.id(), reason);
///     });
/// });
/// ```
pub struct Socket {
    /// Unique identifier for this socket, sent to the client in the CONNECT reply.
    id: String,

    /// The namespace this socket was created in.
    nsp: Arc<Namespace>,

    /// The connection this socket's packets are written to.
    ///
    /// Shared with every other socket multiplexed on the same transport.
    conn: Arc<Connection>,

    /// Cleared exactly once, by whichever disconnect path runs first.
    connected: AtomicBool,

    handshake: Handshake,
    extensions: Extensions,

    /// Event handlers registered with [`Socket::on`].
    events: EventRegistry,

    /// Taken and run on disconnect.
    on_disconnect: parking_lot::Mutex<Option<DisconnectFn>>,
}

impl Socket {
    pub(crate) fn new(
        id: String,
        nsp: Arc<Namespace>,
        conn: Arc<Connection>,
        handshake: Handshake,
    ) -> SocketRef {
        Arc::new(Self {
            id,
            nsp,
            conn,
            connected: AtomicBool::new(true),
            handshake,
            extensions: Extensions::default(),
            events: EventRegistry::default(),
            on_disconnect: parking_lot::Mutex::new(None),
        })
    }

    /// Unique id of this socket. Every socket is also a member of the room
    /// named after its id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the namespace this socket belongs to.
    pub fn ns(&self) -> &str {
        self.nsp.name()
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.nsp
    }

    /// The connection this socket is multiplexed on.
    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Auth payload the client sent with its CONNECT packet.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Arbitrary per-socket state for handlers.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// `false` once the socket has been disconnected.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Registers a handler for `event`, replacing any previous one.
    ///
    /// Incoming arguments are checked against `signature`. A mismatch is
    /// logged and the handler is not called. The handler gets an
    /// [`AckSender`] only when the signature declares one and the client
    /// asked for an acknowledgement.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use wynd_io::event::{ArgKind, Signature};
    /// use wynd_io::socket::SocketRef;
    ///
    /// fn register(socket: &SocketRef) {
    ///     socket.on("upload", Signature::new([ArgKind::Binary]).with_ack(), |_, args, ack| async move {
    ///         let size = args.bytes(0).map(<[u8]>::len).unwrap_or(0);
    ///         if let Some(ack) = ack {
    ///             let _ = ack.send([size as u64]).await;
    ///         }
    ///     });
    /// }
    /// ```
    pub fn on<F, Fut>(&self, event: impl Into<String>, signature: Signature, handler: F)
    where
        F: Fn(SocketRef, Args, Option<AckSender>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.events.register(event, signature, handler);
    }

    /// Removes the handler for `event`. Returns whether one was registered.
    pub fn off(&self, event: &str) -> bool {
        self.events.remove(event)
    }

    /// Registers the callback run once when this socket disconnects.
    pub fn on_disconnect<F, Fut>(&self, handler: F)
    where
        F: FnOnce(SocketRef, DisconnectReason) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: DisconnectFn =
            Box::new(move |socket: SocketRef, reason: DisconnectReason| -> BoxFuture<()> {
                Box::pin(handler(socket, reason))
            });
        *self.on_disconnect.lock() = Some(handler);
    }

    /// Sends an event to this client only.
    ///
    /// Binary values anywhere in `args` turn the packet into a BINARY_EVENT
    /// followed by one binary frame per buffer.
    ///
    /// ## Errors
    ///
    /// [`Error::SocketClosed`] after disconnect, otherwise any encode or
    /// transport write error.
    pub async fn emit<I>(&self, event: &str, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        if !self.connected() {
            return Err(Error::SocketClosed);
        }
        let args = args.into_iter().map(Into::into).collect();
        let packet = Packet::event(self.ns(), event, args);
        self.conn.send_packet(&packet).await
    }

    /// Adds this socket to `rooms`. Joining twice is a no-op.
    pub async fn join<I>(&self, rooms: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let rooms: Vec<String> = rooms.into_iter().map(Into::into).collect();
        self.nsp.adapter().join(&self.id, &rooms).await;
    }

    /// Removes this socket from `rooms`. Leaving a room it is not in is a no-op.
    pub async fn leave<I>(&self, rooms: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let rooms: Vec<String> = rooms.into_iter().map(Into::into).collect();
        self.nsp.adapter().leave(&self.id, &rooms).await;
    }

    /// Rooms this socket is currently in, including its own id room.
    pub async fn rooms(&self) -> Vec<String> {
        self.nsp.adapter().rooms_of(&self.id).await
    }

    /// Broadcast to the members of `rooms`, excluding this socket.
    pub fn to<I>(&self, rooms: I) -> BroadcastOperator
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.broadcast().to(rooms)
    }

    /// Broadcast to every socket of the namespace except this one.
    pub fn broadcast(&self) -> BroadcastOperator {
        BroadcastOperator::new(Arc::clone(&self.nsp)).except([self.id.clone()])
    }

    /// Disconnects this socket from its namespace.
    ///
    /// With `close_transport` the whole connection is closed too, which
    /// disconnects the connection's sockets in other namespaces. Otherwise a
    /// DISCONNECT packet tells the client this namespace is gone. Calling it
    /// again is a no-op.
    pub async fn disconnect(self: &Arc<Self>, close_transport: bool) {
        self.close(DisconnectReason::ServerNamespaceDisconnect, close_transport)
            .await;
    }

    /// Routes one EVENT or BINARY_EVENT packet to its handler.
    pub(crate) async fn dispatch_event(self: &Arc<Self>, packet: Packet) {
        let Some(event) = packet.event_name() else {
            return;
        };
        let Some(handler) = self.events.get(event) else {
            debug!(sid = %self.id, event, "no handler registered");
            return;
        };

        let args = match handler.signature().decode(packet.event_args()) {
            Ok(args) => args,
            Err(e) => {
                debug!(sid = %self.id, event, error = %e, "event arguments rejected");
                return;
            }
        };

        let ack = match packet.ack_id {
            Some(id) if handler.signature().takes_ack() => {
                Some(AckSender::new(id, self.ns(), Arc::clone(&self.conn)))
            }
            Some(id) => {
                debug!(sid = %self.id, event, ack_id = id, "handler takes no ack");
                None
            }
            None => None,
        };

        handler.call(Arc::clone(self), args, ack).await;
    }

    /// Tears the socket down exactly once. Returns `false` if it was already
    /// disconnected.
    pub(crate) async fn close(self: &Arc<Self>, reason: DisconnectReason, close_transport: bool) -> bool {
        if self
            .connected
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if reason == DisconnectReason::ServerNamespaceDisconnect && !close_transport {
            let _ = self.conn.send_packet(&Packet::disconnect(self.ns())).await;
        }

        self.nsp.remove(&self.id).await;
        self.conn.detach(self.ns());
        if close_transport {
            self.conn.close().await;
        }

        info!(sid = %self.id, namespace = self.ns(), %reason, "socket disconnected");

        let handler = self.on_disconnect.lock().take();
        if let Some(handler) = handler {
            handler(Arc::clone(self), reason).await;
        }
        true
    }
}

impl Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("namespace", &self.nsp.name())
            .field("session", &self.conn.id())
            .field("connected", &self.connected())
            .finish_non_exhaustive()
    }
}
