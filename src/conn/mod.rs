//! One transport session and the sockets multiplexed over it.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::packet::{Packet, PacketType};
use crate::parser::{self, Parser};
use crate::server::Server;
use crate::socket::{Socket, SocketRef};
use crate::transport::{Frame, Session, TransportError};
use crate::types::DisconnectReason;

/// Message sent with CONNECT_ERROR when a client names an unknown namespace.
pub const INVALID_NAMESPACE: &str = "Invalid namespace";

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the first CONNECT packet.
    AwaitingHandshake,
    Active,
    /// Terminal. The read loop has stopped.
    Closed,
}

/// Owns one transport session and routes its packets to namespaces.
///
/// A client opens one connection and then joins any number of namespaces
/// over it, each through its own CONNECT packet.
pub struct Connection {
    /// The underlying transport session.
    session: Arc<dyn Session>,

    /// Used to resolve namespaces by name.
    server: Server,

    /// namespace name -> socket
    sockets: parking_lot::Mutex<HashMap<String, Weak<Socket>>>,

    /// Current lifecycle state.
    state: Mutex<ConnState>,

    /// Held while the frames of one packet are written, so a text frame and
    /// its attachments are never interleaved with another packet.
    write_lock: Mutex<()>,
}

impl Connection {
    pub(crate) fn new(session: Arc<dyn Session>, server: Server) -> Arc<Self> {
        Arc::new(Self {
            session,
            server,
            sockets: parking_lot::Mutex::new(HashMap::new()),
            state: Mutex::new(ConnState::AwaitingHandshake),
            write_lock: Mutex::new(()),
        })
    }

    /// Id of the underlying transport session.
    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub async fn state(&self) -> ConnState {
        *self.state.lock().await
    }

    /// The socket this connection holds in `namespace`, if any.
    pub fn socket(&self, namespace: &str) -> Option<SocketRef> {
        self.sockets.lock().get(namespace).and_then(Weak::upgrade)
    }

    pub(crate) fn attach(&self, namespace: &str, socket: &SocketRef) {
        self.sockets
            .lock()
            .insert(namespace.to_owned(), Arc::downgrade(socket));
    }

    pub(crate) fn detach(&self, namespace: &str) {
        self.sockets.lock().remove(namespace);
    }

    /// Writes already encoded frames in order.
    pub async fn write_frames(&self, frames: &[Frame]) -> std::result::Result<(), TransportError> {
        let _guard = self.write_lock.lock().await;
        for frame in frames {
            self.session.write_message(frame.clone()).await?;
        }
        Ok(())
    }

    /// Encodes and writes one packet. Failures are logged and returned; they
    /// never close the connection.
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        let frames = parser::encode(packet)?;
        if let Err(e) = self.write_frames(&frames).await {
            warn!(session = self.id(), kind = ?packet.kind, error = %e, "write failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Closes the transport session. The read loop notices on its next read.
    pub async fn close(&self) {
        if let Err(e) = self.session.close().await {
            debug!(session = self.id(), error = %e, "error while closing session");
        }
    }

    /// Runs the read loop until the session ends.
    pub(crate) async fn run(self: Arc<Self>) {
        let mut parser = Parser::new(self.server.config().max_attachments);

        if let Err(e) = self.handshake(&mut parser).await {
            warn!(session = self.id(), error = %e, "handshake failed");
            *self.state.lock().await = ConnState::Closed;
            self.close().await;
            return;
        }
        *self.state.lock().await = ConnState::Active;

        loop {
            let frame = match self.session.read_message().await {
                Ok(frame) => frame,
                Err(TransportError::Closed) => {
                    debug!(session = self.id(), "transport closed");
                    self.shutdown(DisconnectReason::TransportError).await;
                    return;
                }
                Err(e) => {
                    warn!(session = self.id(), error = %e, "transport read failed");
                    self.shutdown(DisconnectReason::TransportError).await;
                    return;
                }
            };

            let packet = match parser.decode(frame) {
                Ok(Some(packet)) => packet,
                Ok(None) => continue,
                Err(e) => {
                    warn!(session = self.id(), error = %e, "dropping connection on bad frame");
                    self.shutdown(DisconnectReason::TransportError).await;
                    return;
                }
            };

            if let Err(e) = self.route(packet).await {
                warn!(session = self.id(), error = %e, "protocol violation");
                self.shutdown(DisconnectReason::TransportError).await;
                return;
            }
        }
    }

    async fn handshake(self: &Arc<Self>, parser: &mut Parser) -> Result<()> {
        let frame = self.session.read_message().await?;
        let packet = parser
            .decode(frame)?
            .ok_or_else(|| Error::Protocol("first packet must be CONNECT".into()))?;
        if packet.kind != PacketType::Connect {
            return Err(Error::Protocol(format!(
                "first packet is {:?}, not CONNECT",
                packet.kind
            )));
        }
        self.connect(packet).await
    }

    async fn route(self: &Arc<Self>, packet: Packet) -> Result<()> {
        if packet.kind == PacketType::Connect {
            return self.connect(packet).await;
        }

        if self.server.namespace(&packet.namespace).is_none() {
            return self.reject(&packet.namespace).await;
        }

        match self.socket(&packet.namespace) {
            Some(socket) => {
                socket.namespace().dispatch(socket.id(), packet).await;
            }
            None => {
                debug!(
                    session = self.id(),
                    namespace = %packet.namespace,
                    "no socket for namespace on this connection, packet dropped"
                );
            }
        }
        Ok(())
    }

    async fn connect(self: &Arc<Self>, packet: Packet) -> Result<()> {
        let Some(nsp) = self.server.namespace(&packet.namespace) else {
            return self.reject(&packet.namespace).await;
        };

        if self.socket(nsp.name()).is_some() {
            warn!(
                session = self.id(),
                namespace = nsp.name(),
                "already connected to namespace, CONNECT ignored"
            );
            return Ok(());
        }

        let sid = uuid::Uuid::new_v4().simple().to_string();
        self.send_packet(&Packet::connect(nsp.name(), &sid)).await?;

        let socket = nsp
            .connect(sid, Arc::clone(self), packet.data.as_ref())
            .await;
        info!(session = self.id(), namespace = nsp.name(), sid = socket.id(), "socket connected");
        Ok(())
    }

    /// Sends CONNECT_ERROR for an unknown namespace and fails the connection.
    async fn reject(&self, namespace: &str) -> Result<()> {
        let _ = self
            .send_packet(&Packet::connect_error(namespace, INVALID_NAMESPACE))
            .await;
        Err(Error::Protocol(format!("unknown namespace {namespace:?}")))
    }

    /// Disconnects every socket of this connection, then closes the session.
    async fn shutdown(&self, reason: DisconnectReason) {
        *self.state.lock().await = ConnState::Closed;

        let sockets: Vec<SocketRef> = self
            .sockets
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for socket in sockets {
            socket.close(reason, false).await;
        }

        self.close().await;
        info!(session = self.id(), %reason, "connection closed");
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session", &self.session.id())
            .field("namespaces", &self.sockets.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
