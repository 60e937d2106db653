//! Room membership and broadcast fan-out.
//!
//! Each [`Namespace`] owns one [`Adapter`]. The adapter tracks which sockets
//! are in which rooms and delivers broadcasts to the matching sockets. The
//! in-memory adapter is the default; other implementations (for example one
//! backed by a message bus) can be plugged in through
//! [`crate::server::ServerBuilder::adapter`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::config::BroadcastFailurePolicy;
use crate::namespace::Namespace;
use crate::packet::Packet;
use crate::parser;
use crate::types::DisconnectReason;

/// Which sockets a broadcast reaches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// Every known socket of the namespace, ignoring `includes`.
    pub include_all: bool,
    /// Rooms whose members are targeted when `include_all` is false.
    pub includes: Vec<String>,
    /// Socket ids that never receive the broadcast.
    pub excludes: HashSet<String>,
}

/// Room membership store and broadcast fan-out of one namespace.
///
/// Every operation is idempotent. Implementations must keep the room to
/// socket and socket to room views consistent.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    async fn join(&self, sid: &str, rooms: &[String]);

    async fn leave(&self, sid: &str, rooms: &[String]);

    /// Removes the socket from every room and forgets it.
    async fn leave_all(&self, sid: &str);

    /// Encodes `packet` once and writes it to every targeted socket.
    /// Write failures are logged and never stop delivery to the others.
    async fn broadcast(&self, packet: &Packet, opts: &BroadcastOptions);

    async fn rooms_of(&self, sid: &str) -> Vec<String>;

    async fn sockets_in(&self, room: &str) -> Vec<String>;

    async fn rooms(&self) -> Vec<String>;
}

/// Builds the adapter of a namespace.
pub type AdapterFactory = Arc<dyn Fn(Weak<Namespace>) -> Arc<dyn Adapter> + Send + Sync>;

#[derive(Debug, Default)]
struct Membership {
    /// socket id -> rooms
    sids: HashMap<String, HashSet<String>>,
    /// room -> socket ids
    rooms: HashMap<String, HashSet<String>>,
}

impl Membership {
    fn targets(&self, opts: &BroadcastOptions) -> HashSet<String> {
        let not_excluded = |sid: &&String| !opts.excludes.contains(sid.as_str());
        if opts.include_all {
            self.sids.keys().filter(not_excluded).cloned().collect()
        } else {
            opts.includes
                .iter()
                .filter_map(|room| self.rooms.get(room))
                .flatten()
                .filter(not_excluded)
                .cloned()
                .collect()
        }
    }
}

/// Keeps membership in process memory.
#[derive(Debug)]
pub struct InMemoryAdapter {
    nsp: Weak<Namespace>,
    state: RwLock<Membership>,
}

impl InMemoryAdapter {
    pub fn new(nsp: Weak<Namespace>) -> Self {
        Self {
            nsp,
            state: RwLock::new(Membership::default()),
        }
    }

    pub fn factory() -> AdapterFactory {
        Arc::new(|nsp| Arc::new(InMemoryAdapter::new(nsp)) as Arc<dyn Adapter>)
    }

    /// Socket ids a broadcast with `opts` would reach right now.
    pub async fn targets(&self, opts: &BroadcastOptions) -> HashSet<String> {
        self.state.read().await.targets(opts)
    }
}

#[async_trait]
impl Adapter for InMemoryAdapter {
    async fn join(&self, sid: &str, rooms: &[String]) {
        debug!(sid, ?rooms, "join");
        let mut state = self.state.write().await;
        let joined = state.sids.entry(sid.to_owned()).or_default();
        joined.extend(rooms.iter().cloned());
        for room in rooms {
            state
                .rooms
                .entry(room.clone())
                .or_default()
                .insert(sid.to_owned());
        }
    }

    async fn leave(&self, sid: &str, rooms: &[String]) {
        debug!(sid, ?rooms, "leave");
        let mut state = self.state.write().await;
        if let Some(joined) = state.sids.get_mut(sid) {
            for room in rooms {
                joined.remove(room);
            }
        }
        for room in rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(sid);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
    }

    async fn leave_all(&self, sid: &str) {
        debug!(sid, "leave all");
        let mut state = self.state.write().await;
        let Some(joined) = state.sids.remove(sid) else {
            return;
        };
        for room in joined {
            if let Some(members) = state.rooms.get_mut(&room) {
                members.remove(sid);
                if members.is_empty() {
                    state.rooms.remove(&room);
                }
            }
        }
    }

    async fn broadcast(&self, packet: &Packet, opts: &BroadcastOptions) {
        let Some(nsp) = self.nsp.upgrade() else {
            return;
        };

        let frames = match parser::encode(packet) {
            Ok(frames) => frames,
            Err(e) => {
                error!(namespace = nsp.name(), error = %e, "failed to encode broadcast");
                return;
            }
        };

        let targets: Vec<String> = self.targets(opts).await.into_iter().collect();
        let sockets = nsp.sockets_by_id(&targets).await;

        let mut failed = Vec::new();
        for socket in &sockets {
            if let Err(e) = socket.conn().write_frames(&frames).await {
                warn!(
                    namespace = nsp.name(),
                    sid = socket.id(),
                    error = %e,
                    "broadcast write failed"
                );
                failed.push(Arc::clone(socket));
            }
        }
        debug!(
            namespace = nsp.name(),
            delivered = sockets.len() - failed.len(),
            failed = failed.len(),
            "broadcast done"
        );

        if nsp.config().broadcast_failure == BroadcastFailurePolicy::Disconnect {
            for socket in failed {
                socket
                    .close(DisconnectReason::TransportError, true)
                    .await;
            }
        }
    }

    async fn rooms_of(&self, sid: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .sids
            .get(sid)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn sockets_in(&self, room: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .rooms
            .get(room)
            .map(|sids| sids.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn rooms(&self) -> Vec<String> {
        self.state.read().await.rooms.keys().cloned().collect()
    }
}
