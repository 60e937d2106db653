//! The transport session contract and its WebSocket implementation.
//!
//! The protocol layer only needs ordered text/binary messages, an id and a
//! way to close. [`Session`] captures that; [`WsSession`] provides it over a
//! `tokio-tungstenite` stream, one WebSocket message per frame.

use std::fmt::Debug;
use std::net::SocketAddr;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::debug;

/// One transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("{0}")]
    Other(String),
}

/// A bidirectional, ordered message session.
///
/// `read_message` is only ever called from the owning connection's task;
/// `write_message` may be called concurrently from any task (direct emits,
/// broadcasts from other connections, acknowledgements).
#[async_trait]
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Waits for the next frame. Returns `TransportError::Closed` once the
    /// peer or `close` has ended the session.
    async fn read_message(&self) -> Result<Frame, TransportError>;

    async fn write_message(&self, frame: Frame) -> Result<(), TransportError>;

    /// Closes the session. A pending `read_message` returns an error.
    async fn close(&self) -> Result<(), TransportError>;
}

/// [`Session`] over a WebSocket stream.
#[derive(Debug)]
pub struct WsSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static,
{
    id: String,
    addr: Option<SocketAddr>,
    writer: Mutex<SplitSink<WebSocketStream<T>, Message>>,
    reader: Mutex<SplitStream<WebSocketStream<T>>>,
    closed: watch::Sender<bool>,
}

impl<T> WsSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static,
{
    pub fn new(websocket: WebSocketStream<T>, addr: Option<SocketAddr>) -> Self {
        let (writer, reader) = websocket.split();
        let (closed, _) = watch::channel(false);
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            addr,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            closed,
        }
    }

    /// Remote address, when the stream came from a TCP listener.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

#[async_trait]
impl<T> Session for WsSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_message(&self) -> Result<Frame, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut reader = self.reader.lock().await;
        loop {
            let msg = tokio::select! {
                msg = reader.next() => msg,
                _ = async { closed.wait_for(|c| *c).await.map(|_| ()) } => {
                    return Err(TransportError::Closed);
                }
            };

            match msg {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => return Ok(Frame::Binary(bytes.to_vec())),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(session = %self.id, ?frame, "peer closed websocket");
                    return Err(TransportError::Closed);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn write_message(&self, frame: Frame) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        let mut writer = self.writer.lock().await;
        writer.send(msg).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(Message::Close(None)).await {
            debug!(session = %self.id, error = %e, "close frame not delivered");
        }
        Ok(())
    }
}
