use tracing_subscriber::EnvFilter;
use wynd_io::event::{ArgKind, Signature};
use wynd_io::server::Server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);

    let server = Server::new();

    server.of("/").on_connection(|socket| async move {
        socket.on("ping", Signature::empty(), |socket, _, _| async move {
            let _ = socket.emit("pong", Vec::<String>::new()).await;
        });

        socket.on(
            "sum",
            Signature::new([ArgKind::Float, ArgKind::Float]).with_ack(),
            |_, args, ack| async move {
                let total = args.float(0).unwrap_or(0.0) + args.float(1).unwrap_or(0.0);
                if let Some(ack) = ack {
                    let _ = ack.send([total]).await;
                }
            },
        );

        socket.on(
            "upload",
            Signature::new([ArgKind::String, ArgKind::Binary]).with_ack(),
            |_, args, ack| async move {
                let name = args.str(0).unwrap_or_default();
                let size = args.bytes(1).map(<[u8]>::len).unwrap_or(0);
                println!("received {name} ({size} bytes)");
                if let Some(ack) = ack {
                    let _ = ack.send([size as u64]).await;
                }
            },
        );

        socket.on("join", Signature::new([ArgKind::String]), |socket, args, _| async move {
            if let Some(room) = args.str(0) {
                socket.join([room]).await;
            }
        });

        socket.on(
            "chat",
            Signature::new([ArgKind::String, ArgKind::String]),
            |socket, args, _| async move {
                let (Some(room), Some(text)) = (args.str(0), args.str(1)) else {
                    return;
                };
                let _ = socket
                    .to([room])
                    .emit("chat", [socket.id(), text])
                    .await;
            },
        );

        socket.on_disconnect(|socket, reason| async move {
            println!("{} disconnected: {}", socket.id(), reason);
        });
    });

    server
        .listen(port, || {
            println!("Server running on ws://localhost:{port}");
        })
        .await
        .unwrap();
}
