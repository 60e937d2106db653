//! Room-targeted broadcasting.

use std::sync::Arc;

use crate::error::Result;
use crate::namespace::Namespace;
use crate::packet::Packet;
use crate::room::BroadcastOptions;
use crate::value::Value;

/// Builds the target set of a broadcast, then emits through the namespace
/// adapter.
///
/// Without any [`to`](Self::to) call every socket of the namespace is
/// targeted. Adding rooms narrows the broadcast to their members.
///
/// ## Example
///
/// ```rust,no_run
/// use wynd_io::socket::SocketRef;
///
/// async fn relay(socket: SocketRef, text: String) {
///     // everyone in "lobby" except the sender
///     let _ = socket.to(["lobby"]).emit("chat", [text]).await;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BroadcastOperator {
    nsp: Arc<Namespace>,
    opts: BroadcastOptions,
}

impl BroadcastOperator {
    pub(crate) fn new(nsp: Arc<Namespace>) -> Self {
        Self {
            nsp,
            opts: BroadcastOptions {
                include_all: true,
                ..Default::default()
            },
        }
    }

    /// Targets the members of `rooms`, in addition to rooms added earlier.
    pub fn to<I>(mut self, rooms: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.opts.include_all = false;
        self.opts.includes.extend(rooms.into_iter().map(Into::into));
        self
    }

    /// Never delivers to the given socket ids.
    pub fn except<I>(mut self, sids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.opts.excludes.extend(sids.into_iter().map(Into::into));
        self
    }

    pub fn options(&self) -> &BroadcastOptions {
        &self.opts
    }

    /// Encodes the event once and writes it to every target. Per-socket write
    /// failures are handled by the adapter and do not fail the call.
    pub async fn emit<I>(&self, event: &str, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let args = args.into_iter().map(Into::into).collect();
        let packet = Packet::event(self.nsp.name(), event, args);
        self.nsp.adapter().broadcast(&packet, &self.opts).await;
        Ok(())
    }
}
