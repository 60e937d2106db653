//! Packet framing.
//!
//! Text frame grammar:
//!
//! ```text
//! <type-digit>[<attachments>-][<namespace>,][<ack id>][<json payload>]
//! ```
//!
//! BINARY_EVENT and BINARY_ACK packets are followed by `attachments` binary
//! frames. Inside the JSON payload each attachment is referenced by a
//! placeholder object `{"_placeholder":true,"num":<index>}`.

use crate::error::DecodeError;
use crate::packet::{Packet, PacketType, MAIN_NAMESPACE};
use crate::transport::Frame;
use crate::value::Value;

const PLACEHOLDER_KEY: &str = "_placeholder";
const PLACEHOLDER_NUM: &str = "num";

/// Default bound on the attachment count a peer may declare.
pub const DEFAULT_MAX_ATTACHMENTS: usize = 64;

/// Stateful decoder for one connection.
///
/// Holds the reconstruction buffer: a binary packet whose text frame has
/// arrived but whose attachments have not all been received yet.
#[derive(Debug)]
pub struct Parser {
    max_attachments: usize,
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    packet: Packet,
    buffers: Vec<Vec<u8>>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTACHMENTS)
    }
}

impl Parser {
    pub fn new(max_attachments: usize) -> Self {
        Self {
            max_attachments,
            pending: None,
        }
    }

    /// Number of attachments still expected by the pending binary packet.
    pub fn missing_attachments(&self) -> usize {
        self.pending
            .as_ref()
            .map_or(0, |p| p.packet.attachments - p.buffers.len())
    }

    /// Feeds one frame into the decoder.
    ///
    /// Returns `Ok(None)` while a binary packet is still waiting for
    /// attachments.
    pub fn decode(&mut self, frame: Frame) -> Result<Option<Packet>, DecodeError> {
        match frame {
            Frame::Text(text) => {
                if self.pending.is_some() {
                    return Err(DecodeError::UnexpectedText {
                        missing: self.missing_attachments(),
                    });
                }

                let packet = decode_text(&text)?;
                if !packet.kind.is_binary() || packet.attachments == 0 {
                    return Ok(Some(packet));
                }
                if packet.attachments > self.max_attachments {
                    return Err(DecodeError::TooManyAttachments {
                        declared: packet.attachments,
                        max: self.max_attachments,
                    });
                }

                let buffers = Vec::with_capacity(packet.attachments);
                self.pending = Some(Pending { packet, buffers });
                Ok(None)
            }
            Frame::Binary(bytes) => {
                let pending = self.pending.as_mut().ok_or(DecodeError::UnexpectedBinary)?;
                pending.buffers.push(bytes);
                if pending.buffers.len() < pending.packet.attachments {
                    return Ok(None);
                }

                let Some(Pending { mut packet, buffers }) = self.pending.take() else {
                    return Ok(None);
                };
                let mut slots: Vec<Option<Vec<u8>>> = buffers.into_iter().map(Some).collect();
                if let Some(data) = packet.data.as_mut() {
                    fill_placeholders(data, &mut slots)?;
                }
                if let Some(unused) = slots.iter().position(Option::is_some) {
                    return Err(DecodeError::UnusedAttachment(unused));
                }
                Ok(Some(packet))
            }
        }
    }
}

/// Parses a single text frame. Placeholders in binary packets are left as
/// plain objects; [`Parser::decode`] swaps them for attachments.
pub fn decode_text(text: &str) -> Result<Packet, DecodeError> {
    let first = text.chars().next().ok_or(DecodeError::EmptyFrame)?;
    let kind = PacketType::from_digit(first).ok_or(DecodeError::InvalidType(first))?;
    let mut rest = &text[1..];

    let mut attachments = 0;
    if kind.is_binary() {
        let end = rest.find('-').ok_or(DecodeError::UnterminatedAttachments)?;
        let digits = &rest[..end];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeError::InvalidAttachments(digits.to_owned()));
        }
        attachments = digits
            .parse()
            .map_err(|_| DecodeError::InvalidAttachments(digits.to_owned()))?;
        rest = &rest[end + 1..];
    }

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(end) => {
                let namespace = &rest[..end];
                rest = &rest[end + 1..];
                namespace
            }
            None => std::mem::take(&mut rest),
        }
    } else {
        MAIN_NAMESPACE
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        let id = &rest[..digits];
        rest = &rest[digits..];
        Some(
            id.parse()
                .map_err(|_| DecodeError::InvalidAckId(id.to_owned()))?,
        )
    } else {
        None
    };

    let data = if rest.is_empty() {
        None
    } else {
        Some(Value::from(serde_json::from_str::<serde_json::Value>(rest)?))
    };

    let packet = Packet {
        kind,
        namespace: namespace.to_owned(),
        ack_id,
        attachments,
        data,
    };
    if !packet.has_valid_payload() {
        return Err(DecodeError::InvalidPayload(kind));
    }
    Ok(packet)
}

/// Encodes a packet into its text frame followed by one binary frame per
/// attachment.
///
/// Binary values anywhere in the payload are extracted in depth-first order.
/// If any are found an EVENT becomes a BINARY_EVENT and an ACK a BINARY_ACK.
pub fn encode(packet: &Packet) -> Result<Vec<Frame>, serde_json::Error> {
    let mut buffers = Vec::new();
    let json = packet
        .data
        .as_ref()
        .map(|data| extract_attachments(data, &mut buffers));

    let kind = if buffers.is_empty() {
        packet.kind
    } else {
        packet.kind.promoted()
    };

    let mut text = String::new();
    text.push(kind.digit());
    if kind.is_binary() {
        text.push_str(&buffers.len().to_string());
        text.push('-');
    }
    if packet.namespace != MAIN_NAMESPACE {
        text.push_str(&packet.namespace);
        text.push(',');
    }
    if let Some(id) = packet.ack_id {
        text.push_str(&id.to_string());
    }
    if let Some(json) = json {
        text.push_str(&serde_json::to_string(&json)?);
    }

    let mut frames = Vec::with_capacity(buffers.len() + 1);
    frames.push(Frame::Text(text));
    frames.extend(buffers.into_iter().map(Frame::Binary));
    Ok(frames)
}

fn extract_attachments(value: &Value, buffers: &mut Vec<Vec<u8>>) -> serde_json::Value {
    match value {
        Value::Binary(bytes) => {
            let num = buffers.len();
            buffers.push(bytes.clone());
            let mut placeholder = serde_json::Map::new();
            placeholder.insert(PLACEHOLDER_KEY.to_owned(), serde_json::Value::Bool(true));
            placeholder.insert(PLACEHOLDER_NUM.to_owned(), serde_json::Value::from(num));
            serde_json::Value::Object(placeholder)
        }
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| extract_attachments(item, buffers))
                .collect(),
        ),
        Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), extract_attachments(v, buffers)))
                .collect(),
        ),
        other => other.clone().into_json(),
    }
}

fn fill_placeholders(value: &mut Value, slots: &mut [Option<Vec<u8>>]) -> Result<(), DecodeError> {
    match value {
        Value::Object(map) if map.get(PLACEHOLDER_KEY) == Some(&Value::Bool(true)) => {
            let num = map
                .get(PLACEHOLDER_NUM)
                .and_then(Value::as_u64)
                .ok_or(DecodeError::MalformedPlaceholder)?;
            let count = slots.len();
            let slot = usize::try_from(num)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .ok_or(DecodeError::BadPlaceholder { num, count })?;
            let bytes = slot.take().ok_or(DecodeError::DuplicatePlaceholder(num))?;
            *value = Value::Binary(bytes);
            Ok(())
        }
        Value::Object(map) => map
            .values_mut()
            .try_for_each(|v| fill_placeholders(v, slots)),
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|v| fill_placeholders(v, slots)),
        _ => Ok(()),
    }
}
