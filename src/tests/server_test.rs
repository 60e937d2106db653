#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::config::ServerConfig;
    use crate::event::{ArgKind, Signature};
    use crate::server::Server;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn demo_server(config: ServerConfig) -> Server {
        let server = Server::with_config(config);
        server.of("/").on_connection(|socket| async move {
            socket.on(
                "sum",
                Signature::new([ArgKind::Int, ArgKind::Int]).with_ack(),
                |_, args, ack| async move {
                    if let Some(ack) = ack {
                        let _ = ack.send([args.int(0).unwrap_or(0) + args.int(1).unwrap_or(0)]).await;
                    }
                },
            );
            socket.on(
                "upload",
                Signature::new([ArgKind::String, ArgKind::Binary]).with_ack(),
                |_, args, ack| async move {
                    if let Some(ack) = ack {
                        let size = args.bytes(1).map(<[u8]>::len).unwrap_or(0);
                        let _ = ack.send([size as u64]).await;
                    }
                },
            );
        });
        server
    }

    async fn start(server: Server) -> (Client, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        let (ws, _) = connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .expect("connect ws");
        (ws, handle)
    }

    async fn recv_text(ws: &mut Client) -> String {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out")
                .expect("stream ended")
                .expect("websocket error");
            match msg {
                Message::Text(text) => return text.as_str().to_owned(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_listen_handshake_event_and_ack() {
        let (mut ws, server) = start(demo_server(ServerConfig::default())).await;

        ws.send(Message::Text(r#"0{"token":"abc"}"#.into())).await.unwrap();
        let reply = recv_text(&mut ws).await;
        assert!(reply.starts_with(r#"0{"sid":""#), "{reply}");

        ws.send(Message::Text(r#"25["sum",2,3]"#.into())).await.unwrap();
        assert_eq!(recv_text(&mut ws).await, "35[5]");

        let _ = ws.close(None).await;
        server.abort();
    }

    #[tokio::test]
    async fn test_listen_binary_upload() {
        let (mut ws, server) = start(demo_server(ServerConfig::default())).await;

        ws.send(Message::Text("0".into())).await.unwrap();
        recv_text(&mut ws).await;

        ws.send(Message::Text(
            r#"51-8["upload","f.bin",{"_placeholder":true,"num":0}]"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Binary(vec![0u8; 3].into())).await.unwrap();

        assert_eq!(recv_text(&mut ws).await, "38[3]");

        let _ = ws.close(None).await;
        server.abort();
    }

    #[tokio::test]
    async fn test_oversized_message_closes_connection() {
        let config = ServerConfig::default().with_max_payload(64);
        let (mut ws, server) = start(demo_server(config)).await;

        ws.send(Message::Text("0".into())).await.unwrap();
        recv_text(&mut ws).await;

        let big = format!(r#"2["sum","{}"]"#, "x".repeat(256));
        let _ = ws.send(Message::Text(big.into())).await;

        let ended = timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(ended.is_ok(), "connection stayed open");
        server.abort();
    }

    #[tokio::test]
    async fn test_close_stops_accepting_but_keeps_open_connections() {
        let server = demo_server(ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().unwrap().port();
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .expect("connect ws");
        ws.send(Message::Text("0".into())).await.unwrap();
        recv_text(&mut ws).await;

        server.close();
        assert!(server.is_closed());
        let result = timeout(Duration::from_secs(2), serving)
            .await
            .expect("serve kept running")
            .unwrap();
        assert!(result.is_ok());

        ws.send(Message::Text(r#"27["sum",2,3]"#.into())).await.unwrap();
        assert_eq!(recv_text(&mut ws).await, "37[5]");
    }
}
