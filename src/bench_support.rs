#![cfg(feature = "bench")]

//! Internal helpers for Criterion benchmarks.
//!
//! Clients are real WebSocket sessions over `tokio::io::DuplexStream`, so the
//! benchmarks exercise the connection read loop, the adapter and the codec
//! without binding sockets.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{protocol::Role, Message};
use tokio_tungstenite::WebSocketStream;

use crate::namespace::Namespace;
use crate::packet::{Packet, MAIN_NAMESPACE};
use crate::server::Server;
use crate::transport::WsSession;
use crate::value::Value;

/// Stream type used for in-process benchmarking.
pub type BenchStream = DuplexStream;

/// Room joined by every other bench client.
pub const BENCH_ROOM: &str = "bench-room";

/// A server whose main namespace holds `client_count` connected sockets.
pub struct BroadcastContext {
    pub server: Server,
    pub namespace: Arc<Namespace>,
    drains: Vec<JoinHandle<()>>,
}

impl BroadcastContext {
    /// Connects `client_count` clients; every second one joins [`BENCH_ROOM`].
    pub async fn with_clients(client_count: usize) -> Self {
        let server = Server::new();
        let namespace = server.of(MAIN_NAMESPACE);

        let mut drains = Vec::with_capacity(client_count);
        for _ in 0..client_count {
            drains.push(connect_client(&server).await);
        }
        while namespace.socket_count().await < client_count {
            tokio::task::yield_now().await;
        }

        for (i, socket) in namespace.sockets().await.into_iter().enumerate() {
            if i % 2 == 0 {
                socket.join([BENCH_ROOM]).await;
            }
        }

        Self {
            server,
            namespace,
            drains,
        }
    }

    /// Text event to every socket.
    pub async fn emit_all(&self, text: &str) {
        let _ = self.namespace.emit("bench", [text]).await;
    }

    /// Text event to the members of [`BENCH_ROOM`].
    pub async fn emit_room(&self, text: &str) {
        let _ = self.namespace.to([BENCH_ROOM]).emit("bench", [text]).await;
    }

    /// Event with one binary attachment to every socket.
    pub async fn emit_binary(&self, bytes: &[u8]) {
        let _ = self.namespace.emit("bench", [Value::binary(bytes)]).await;
    }
}

impl Drop for BroadcastContext {
    fn drop(&mut self) {
        for drain in &self.drains {
            drain.abort();
        }
    }
}

/// Accepts one duplex session on `server`, sends CONNECT from the client end
/// and keeps reading so server writes never block.
async fn connect_client(server: &Server) -> JoinHandle<()> {
    let (server_io, client_io) = tokio::io::duplex(1024 * 1024);
    let ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    server.accept(WsSession::new(ws, None));

    let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let _ = client.send(Message::Text("0".into())).await;
    tokio::spawn(async move { while let Some(Ok(_)) = client.next().await {} })
}

/// An event packet with a nested payload and `attachments` binary buffers.
pub fn sample_packet(attachments: usize) -> Packet {
    let mut args = vec![Value::object([
        ("user", Value::from("bench")),
        ("seq", Value::from(42)),
        ("tags", Value::Array(vec![Value::from("a"), Value::from("b")])),
    ])];
    args.extend((0..attachments).map(|i| Value::binary(vec![i as u8; 256])));
    Packet::event("/bench", "sample", args).with_ack_id(7)
}
