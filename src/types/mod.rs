use std::collections::HashMap;
use std::fmt::Display;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::value::Value;

/// Boxed future returned by async callbacks.
pub type BoxFuture<T> = futures::future::BoxFuture<'static, T>;

/// Why a socket left its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The server called `Socket::disconnect`.
    ServerNamespaceDisconnect,
    /// The client sent a DISCONNECT packet for the namespace.
    ClientNamespaceDisconnect,
    /// Part of the protocol's reason set. The server reports every failed
    /// read, a clean close included, as [`TransportError`](Self::TransportError).
    TransportClose,
    /// The transport failed or the peer sent an undecodable frame.
    TransportError,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerNamespaceDisconnect => "server namespace disconnect",
            Self::ClientNamespaceDisconnect => "client namespace disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
        }
    }
}

impl Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data the client sent with its CONNECT packet.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub auth: Map<String, JsonValue>,
}

impl Handshake {
    /// Decodes the CONNECT payload. A missing payload gives an empty record;
    /// anything that is not an object is logged and ignored.
    pub(crate) fn from_payload(payload: Option<&Value>) -> Self {
        let auth = match payload {
            None => Map::new(),
            Some(value) => match value.deserialize::<Map<String, JsonValue>>() {
                Ok(auth) => auth,
                Err(e) => {
                    warn!(error = %e, "ignoring undecodable handshake payload");
                    Map::new()
                }
            },
        };
        Self { auth }
    }

    /// Deserializes the auth record into a typed struct.
    pub fn auth_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(JsonValue::Object(self.auth.clone()))
    }
}

/// Free-form key/value state an application attaches to a socket.
#[derive(Debug, Default)]
pub struct Extensions {
    inner: RwLock<HashMap<String, JsonValue>>,
}

impl Extensions {
    /// Stores `value` under `key`, returning the previous entry.
    pub fn insert<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<JsonValue>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.inner.write().insert(key.into(), value))
    }

    /// Returns the entry under `key` decoded as `T`, or `None` if it is
    /// missing or has another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.inner.read().get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn get_raw(&self, key: &str) -> Option<JsonValue> {
        self.inner.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<JsonValue> {
        self.inner.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
