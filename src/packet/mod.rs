//! The protocol packet and its per-kind payload rules.

use crate::value::Value;

/// Name of the default namespace.
pub const MAIN_NAMESPACE: &str = "/";

/// The seven packet kinds, in wire order (`'0'..='6'`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    /// Parses the leading type digit of a text frame.
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Connect),
            '1' => Some(Self::Disconnect),
            '2' => Some(Self::Event),
            '3' => Some(Self::Ack),
            '4' => Some(Self::ConnectError),
            '5' => Some(Self::BinaryEvent),
            '6' => Some(Self::BinaryAck),
            _ => None,
        }
    }

    pub fn digit(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    /// `true` for the two kinds that carry an attachment count.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }

    /// The binary counterpart of `Event`/`Ack`; other kinds are returned unchanged.
    pub fn promoted(self) -> Self {
        match self {
            Self::Event => Self::BinaryEvent,
            Self::Ack => Self::BinaryAck,
            other => other,
        }
    }
}

/// A decoded (or to-be-encoded) protocol packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketType,
    pub namespace: String,
    pub ack_id: Option<u64>,
    /// Number of binary frames following the text frame. Only meaningful for
    /// `BinaryEvent`/`BinaryAck`.
    pub attachments: usize,
    pub data: Option<Value>,
}

impl Packet {
    pub fn new(kind: PacketType, namespace: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            ack_id: None,
            attachments: 0,
            data,
        }
    }

    /// CONNECT reply carrying the socket id as `{"sid": ...}`.
    pub fn connect(namespace: impl Into<String>, sid: &str) -> Self {
        let data = Value::object([("sid", Value::from(sid))]);
        Self::new(PacketType::Connect, namespace, Some(data))
    }

    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Self::new(PacketType::Disconnect, namespace, None)
    }

    /// CONNECT_ERROR carrying `{"message": ...}`.
    pub fn connect_error(namespace: impl Into<String>, message: &str) -> Self {
        let data = Value::object([("message", Value::from(message))]);
        Self::new(PacketType::ConnectError, namespace, Some(data))
    }

    /// EVENT packet with payload `[event, args...]`.
    pub fn event(namespace: impl Into<String>, event: impl Into<String>, args: Vec<Value>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(event.into()));
        data.extend(args);
        Self::new(PacketType::Event, namespace, Some(Value::Array(data)))
    }

    pub fn ack(namespace: impl Into<String>, ack_id: u64, args: Vec<Value>) -> Self {
        let mut packet = Self::new(PacketType::Ack, namespace, Some(Value::Array(args)));
        packet.ack_id = Some(ack_id);
        packet
    }

    pub fn with_ack_id(mut self, ack_id: u64) -> Self {
        self.ack_id = Some(ack_id);
        self
    }

    /// Checks the payload against the shape required by the packet kind.
    pub fn has_valid_payload(&self) -> bool {
        match (self.kind, &self.data) {
            (PacketType::Connect, None) => true,
            (PacketType::Connect, Some(data)) => data.is_object(),
            (PacketType::Disconnect, data) => data.is_none(),
            (PacketType::ConnectError, Some(data)) => data.is_object() || data.is_string(),
            (PacketType::Event | PacketType::BinaryEvent, Some(Value::Array(items))) => {
                matches!(items.first(), Some(Value::String(_)))
            }
            (PacketType::Ack | PacketType::BinaryAck, Some(data)) => data.is_array(),
            _ => false,
        }
    }

    /// Event name of an EVENT/BINARY_EVENT packet.
    pub fn event_name(&self) -> Option<&str> {
        match (self.kind, &self.data) {
            (PacketType::Event | PacketType::BinaryEvent, Some(Value::Array(items))) => {
                items.first().and_then(Value::as_str)
            }
            _ => None,
        }
    }

    /// Arguments following the event name.
    pub fn event_args(&self) -> &[Value] {
        match &self.data {
            Some(Value::Array(items)) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }
}
