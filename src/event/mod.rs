//! Event handlers and argument decoding.
//!
//! Rust has no runtime reflection over closure parameters, so every handler is
//! registered together with a [`Signature`]: the kinds of its positional
//! arguments, an optional variadic tail and whether it takes an
//! acknowledgement. Incoming event arguments are checked against the
//! signature before the handler runs.
//!
//! ```rust,no_run
//! use wynd_io::event::{ArgKind, Signature};
//! use wynd_io::socket::SocketRef;
//!
//! fn register(socket: &SocketRef) {
//!     let sum = Signature::new([ArgKind::Int, ArgKind::Int]).with_ack();
//!     socket.on("sum", sum, |_socket, args, ack| async move {
//!         let total = args.int(0).unwrap_or(0) + args.int(1).unwrap_or(0);
//!         if let Some(ack) = ack {
//!             let _ = ack.send([total]).await;
//!         }
//!     });
//! }
//! ```

use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::conn::Connection;
use crate::error::{ArgError, Result};
use crate::packet::Packet;
use crate::socket::SocketRef;
use crate::types::BoxFuture;
use crate::value::Value;

/// Kind of a single event argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Any value, including `null` and binary.
    Any,
    Bool,
    /// A JSON number without a fractional part.
    Int,
    /// Any JSON number.
    Float,
    String,
    Binary,
    Array,
    Object,
}

impl ArgKind {
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ArgKind::Any, _) => true,
            (ArgKind::Bool, Value::Bool(_)) => true,
            (ArgKind::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ArgKind::Float, Value::Number(_)) => true,
            (ArgKind::String, Value::String(_)) => true,
            (ArgKind::Binary, Value::Binary(_)) => true,
            (ArgKind::Array, Value::Array(_)) => true,
            (ArgKind::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

impl Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgKind::Any => "any value",
            ArgKind::Bool => "a boolean",
            ArgKind::Int => "an integer",
            ArgKind::Float => "a number",
            ArgKind::String => "a string",
            ArgKind::Binary => "binary data",
            ArgKind::Array => "an array",
            ArgKind::Object => "an object",
        };
        f.write_str(name)
    }
}

/// Declared argument shape of a handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ArgKind>,
    variadic: Option<ArgKind>,
    ack: bool,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = ArgKind>) -> Self {
        Self {
            params: params.into_iter().collect(),
            variadic: None,
            ack: false,
        }
    }

    /// A handler that takes no arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Accepts any number of trailing arguments of `kind` after the
    /// positional ones.
    pub fn variadic(mut self, kind: ArgKind) -> Self {
        self.variadic = Some(kind);
        self
    }

    /// The handler takes an acknowledgement sender.
    pub fn with_ack(mut self) -> Self {
        self.ack = true;
        self
    }

    pub fn params(&self) -> &[ArgKind] {
        &self.params
    }

    pub fn variadic_kind(&self) -> Option<ArgKind> {
        self.variadic
    }

    pub fn takes_ack(&self) -> bool {
        self.ack
    }

    /// Checks `values` positionally against the signature.
    pub fn decode(&self, values: &[Value]) -> std::result::Result<Args, ArgError> {
        if values.len() < self.params.len() {
            return Err(ArgError::Missing {
                expected: self.params.len(),
                got: values.len(),
            });
        }

        for (index, value) in values.iter().enumerate() {
            let kind = match self.params.get(index).copied().or(self.variadic) {
                Some(kind) => kind,
                None => {
                    return Err(ArgError::TooMany {
                        expected: self.params.len(),
                        got: values.len(),
                    })
                }
            };
            if !kind.accepts(value) {
                return Err(ArgError::Mismatch {
                    index,
                    expected: kind,
                });
            }
        }

        Ok(Args(values.to_vec()))
    }
}

/// Event arguments that matched a [`Signature`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn bool(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(Value::as_bool)
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(Value::as_i64)
    }

    pub fn float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(Value::as_f64)
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }

    pub fn bytes(&self, index: usize) -> Option<&[u8]> {
        self.get(index).and_then(Value::as_bytes)
    }

    /// Deserializes one argument into a serde type.
    pub fn parse<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        self.get(index).and_then(|v| v.deserialize().ok())
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

impl IntoIterator for Args {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Replies to an event that carried an ack id.
///
/// Holds the ack id, the namespace and the connection's write path, so it
/// stays usable after the triggering packet is gone.
#[derive(Clone)]
pub struct AckSender {
    ack_id: u64,
    namespace: String,
    conn: Arc<Connection>,
}

impl AckSender {
    pub(crate) fn new(ack_id: u64, namespace: impl Into<String>, conn: Arc<Connection>) -> Self {
        Self {
            ack_id,
            namespace: namespace.into(),
            conn,
        }
    }

    pub fn id(&self) -> u64 {
        self.ack_id
    }

    /// Sends an ACK carrying `args`. Binary values turn it into a BINARY_ACK.
    pub async fn send<I>(&self, args: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let args = args.into_iter().map(Into::into).collect();
        let packet = Packet::ack(self.namespace.clone(), self.ack_id, args);
        self.conn.send_packet(&packet).await
    }
}

impl Debug for AckSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckSender")
            .field("ack_id", &self.ack_id)
            .field("namespace", &self.namespace)
            .field("session", &self.conn.id())
            .finish()
    }
}

type HandlerFn = dyn Fn(SocketRef, Args, Option<AckSender>) -> BoxFuture<()> + Send + Sync;

/// A registered handler and its signature.
pub struct Handler {
    signature: Signature,
    f: Box<HandlerFn>,
}

impl Handler {
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(&self, socket: SocketRef, args: Args, ack: Option<AckSender>) -> BoxFuture<()> {
        (self.f)(socket, args, ack)
    }
}

impl Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Event name to handler map of one socket.
#[derive(Debug, Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Arc<Handler>>>,
}

impl EventRegistry {
    /// Registers `handler` for `event`, replacing any previous one.
    pub fn register<F, Fut>(&self, event: impl Into<String>, signature: Signature, handler: F)
    where
        F: Fn(SocketRef, Args, Option<AckSender>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Handler {
            signature,
            f: Box::new(
                move |socket: SocketRef, args: Args, ack: Option<AckSender>| -> BoxFuture<()> {
                    Box::pin(handler(socket, args, ack))
                },
            ),
        };
        self.handlers.write().insert(event.into(), Arc::new(handler));
    }

    pub fn get(&self, event: &str) -> Option<Arc<Handler>> {
        self.handlers.read().get(event).cloned()
    }

    pub fn remove(&self, event: &str) -> bool {
        self.handlers.write().remove(event).is_some()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
