//! # wynd-io
//!
//! A socket.io v5 protocol server over WebSockets.
//!
//! One transport session carries any number of namespaces. Each namespace
//! has its own sockets, event handlers and rooms. Events may carry binary
//! buffers anywhere in their arguments; they travel as binary frames after
//! the JSON text frame that references them.
//!
//! ```rust,no_run
//! use wynd_io::event::{ArgKind, Signature};
//! use wynd_io::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new();
//!
//!     server.of("/").on_connection(|socket| async move {
//!         socket.join(["lobby"]).await;
//!
//!         socket.on("chat", Signature::new([ArgKind::String]), |socket, args, _| async move {
//!             let text = args.str(0).unwrap_or_default().to_owned();
//!             let _ = socket.to(["lobby"]).emit("chat", [text]).await;
//!         });
//!     });
//!
//!     server.listen(3000, || println!("ready")).await.unwrap();
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod conn;
pub mod error;
pub mod event;
pub mod namespace;
pub mod packet;
pub mod parser;
pub mod room;
pub mod server;
pub mod socket;
pub mod transport;
pub mod types;
pub mod value;

#[cfg(feature = "bench")]
pub mod bench_support;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use server::Server;
pub use socket::SocketRef;
pub use value::Value;
