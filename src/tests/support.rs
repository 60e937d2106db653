//! In-memory session used by the connection, socket and broadcast tests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::packet::{Packet, PacketType};
use crate::parser::Parser;
use crate::server::Server;
use crate::transport::{Frame, Session, TransportError};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

/// Server side of a scripted session.
pub(crate) struct MockSession {
    id: String,
    incoming: Mutex<mpsc::UnboundedReceiver<Frame>>,
    outgoing: mpsc::UnboundedSender<Frame>,
    closed: watch::Sender<bool>,
    fail_writes: Arc<AtomicBool>,
}

/// Client side: pushes frames to the server and observes what it writes.
pub(crate) struct MockClient {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<Frame>,
    closed: watch::Receiver<bool>,
    fail_writes: Arc<AtomicBool>,
    parser: Parser,
}

pub(crate) fn pair(id: &str) -> (MockSession, MockClient) {
    let (to_server, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_server) = mpsc::unbounded_channel();
    let (closed, closed_rx) = watch::channel(false);
    let fail_writes = Arc::new(AtomicBool::new(false));

    let session = MockSession {
        id: id.to_owned(),
        incoming: Mutex::new(incoming),
        outgoing,
        closed,
        fail_writes: Arc::clone(&fail_writes),
    };
    let client = MockClient {
        tx: Some(to_server),
        rx: from_server,
        closed: closed_rx,
        fail_writes,
        parser: Parser::default(),
    };
    (session, client)
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_message(&self) -> Result<Frame, TransportError> {
        let mut closed = self.closed.subscribe();
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            frame = incoming.recv() => frame.ok_or(TransportError::Closed),
            _ = async { closed.wait_for(|c| *c).await.map(|_| ()) } => Err(TransportError::Closed),
        }
    }

    async fn write_message(&self, frame: Frame) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Other("broken pipe".into()));
        }
        let _ = self.outgoing.send(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        Ok(())
    }
}

impl MockClient {
    pub(crate) fn send_text(&self, text: &str) {
        if let Some(tx) = &self.tx {
            tx.send(Frame::Text(text.to_owned())).expect("server gone");
        }
    }

    pub(crate) fn send_binary(&self, bytes: &[u8]) {
        if let Some(tx) = &self.tx {
            tx.send(Frame::Binary(bytes.to_vec())).expect("server gone");
        }
    }

    /// Closes the client end; the server's next read fails.
    pub(crate) fn hang_up(&mut self) {
        self.tx = None;
    }

    /// Makes every later server write fail.
    pub(crate) fn break_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn recv(&mut self) -> Frame {
        timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("session dropped")
    }

    pub(crate) async fn recv_text(&mut self) -> String {
        match self.recv().await {
            Frame::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Next complete packet, with attachments filled in.
    pub(crate) async fn recv_packet(&mut self) -> Packet {
        loop {
            let frame = self.recv().await;
            if let Some(packet) = self.parser.decode(frame).expect("server sent a bad frame") {
                return packet;
            }
        }
    }

    /// Asserts the server writes nothing for a short while.
    pub(crate) async fn expect_silence(&mut self) {
        let next = timeout(Duration::from_millis(100), self.rx.recv()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub(crate) async fn wait_closed(&mut self) {
        timeout(WAIT, self.closed.wait_for(|c| *c))
            .await
            .expect("session was not closed")
            .expect("session dropped");
    }
}

/// Polls `check` until it holds.
pub(crate) async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// A client connected to `namespace` whose connection callback has run.
pub(crate) struct Connected {
    pub client: MockClient,
    pub sid: String,
    pub task: JoinHandle<()>,
}

pub(crate) async fn connect(server: &Server, id: &str, namespace: &str) -> Connected {
    let (session, mut client) = pair(id);
    let task = server.accept(session);

    if namespace == "/" {
        client.send_text("0");
    } else {
        client.send_text(&format!("0{namespace},"));
    }
    let sid = expect_connect(&mut client, namespace).await;
    ready(server, namespace, &sid).await;

    Connected { client, sid, task }
}

/// Reads the CONNECT reply and returns the socket id it carries.
pub(crate) async fn expect_connect(client: &mut MockClient, namespace: &str) -> String {
    let packet = client.recv_packet().await;
    assert_eq!(packet.kind, PacketType::Connect);
    assert_eq!(packet.namespace, namespace);
    packet
        .data
        .as_ref()
        .and_then(|d| d.get("sid"))
        .and_then(|sid| sid.as_str())
        .expect("CONNECT reply without sid")
        .to_owned()
}

/// Waits until the socket has joined its own id room, which happens after
/// the connection callback returns.
pub(crate) async fn ready(server: &Server, namespace: &str, sid: &str) {
    let nsp = server.namespace(namespace).expect("namespace not registered");
    eventually(|| {
        let nsp = Arc::clone(&nsp);
        let sid = sid.to_owned();
        async move { nsp.adapter().rooms_of(&sid).await.contains(&sid) }
    })
    .await;
}

/// Next value from a test channel.
pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a handler")
        .expect("channel closed")
}
