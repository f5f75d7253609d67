//! Wire protocols (codecs) subsystem.
//!
//! # Data Flow
//! ```text
//! complete message bytes (from transport::channel)
//!     → ProtocolFactory::reader (binary | compact | json | simple_json)
//!     → InputProtocol (field-by-field decoding)
//!     → Processor / Serializable
//!
//! Serializable / Processor
//!     → OutputProtocol (field-by-field encoding)
//!     → ProtocolFactory::writer into a Vec<u8>
//!     → transport::channel
//! ```
//!
//! # Design Decisions
//! - Protocols operate on in-memory buffers; the transport layer is responsible
//!   for delivering exactly one complete message per decode
//! - `ProtocolFactory::scanner` tells the transport where a message ends so
//!   unframed streams can be split without side effects on the processor; the
//!   scanner resumes where it stopped as more bytes arrive (see `scan.rs`)
//! - Registries are values, not process-wide state (see `registry.rs`)

pub mod binary;
pub mod compact;
pub mod exception;
pub mod json;
pub mod registry;
pub mod scan;
pub mod simple_json;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use exception::{ApplicationErrorKind, ApplicationException};
pub use registry::ProtocolRegistry;
pub use scan::MessageScanner;

use crate::config::ConfigError;

/// Maximum nesting depth accepted by [`InputProtocol::skip`].
pub const MAX_SKIP_DEPTH: usize = 64;

/// Errors raised while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended before the message was complete.
    #[error("unexpected end of message")]
    UnexpectedEof,

    /// The bytes do not form a valid message for this protocol.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The envelope carried an unsupported protocol version.
    #[error("bad protocol version {0:#x}")]
    BadVersion(u32),

    /// A length or element count was negative.
    #[error("negative size {0}")]
    NegativeSize(i64),

    /// A message or element exceeded the configured limit.
    #[error("size {size} exceeds limit {limit}")]
    SizeLimit { size: usize, limit: usize },

    /// Nested structures exceeded [`MAX_SKIP_DEPTH`].
    #[error("maximum nesting depth exceeded")]
    DepthLimit,

    /// The operation is not available for this protocol.
    #[error("{0} is not supported by this protocol")]
    NotImplemented(&'static str),

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Malformed JSON text.
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Wire encoding selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Strict binary encoding.
    Binary,
    /// Verbose JSON encoding, round-trip capable.
    Json,
    /// Human readable JSON keyed by field name. Write-only.
    SimpleJson,
    /// Compact binary encoding with varints and field-id deltas.
    Compact,
}

impl ProtocolKind {
    /// All selectors, in registry order.
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::Binary,
        ProtocolKind::Json,
        ProtocolKind::SimpleJson,
        ProtocolKind::Compact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Binary => "binary",
            ProtocolKind::Json => "json",
            ProtocolKind::SimpleJson => "simple_json",
            ProtocolKind::Compact => "compact",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(ProtocolKind::Binary),
            "json" => Ok(ProtocolKind::Json),
            "simple_json" | "simplejson" => Ok(ProtocolKind::SimpleJson),
            "compact" => Ok(ProtocolKind::Compact),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Numeric selectors, in the order the encodings were historically numbered.
impl TryFrom<i32> for ProtocolKind {
    type Error = ConfigError;

    fn try_from(value: i32) -> std::result::Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| ProtocolKind::ALL.get(idx).copied())
            .ok_or_else(|| ConfigError::UnknownProtocol(value.to_string()))
    }
}

/// Kind of RPC message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    OneWay = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Call),
            2 => Ok(MessageType::Reply),
            3 => Ok(MessageType::Exception),
            4 => Ok(MessageType::OneWay),
            other => Err(ProtocolError::InvalidData(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

/// Type tag of a field or container element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Stop = 0,
    Void = 1,
    Bool = 2,
    I8 = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TryFrom<u8> for FieldType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FieldType::Stop),
            1 => Ok(FieldType::Void),
            2 => Ok(FieldType::Bool),
            3 => Ok(FieldType::I8),
            4 => Ok(FieldType::Double),
            6 => Ok(FieldType::I16),
            8 => Ok(FieldType::I32),
            10 => Ok(FieldType::I64),
            11 => Ok(FieldType::String),
            12 => Ok(FieldType::Struct),
            13 => Ok(FieldType::Map),
            14 => Ok(FieldType::Set),
            15 => Ok(FieldType::List),
            other => Err(ProtocolError::InvalidData(format!(
                "unknown field type {}",
                other
            ))),
        }
    }
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageIdentifier {
    pub name: String,
    pub message_type: MessageType,
    pub sequence_number: i32,
}

impl MessageIdentifier {
    pub fn new(name: impl Into<String>, message_type: MessageType, sequence_number: i32) -> Self {
        Self {
            name: name.into(),
            message_type,
            sequence_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructIdentifier {
    pub name: String,
}

impl StructIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Field header. `id` is `None` only for the stop marker or for protocols that
/// identify fields by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIdentifier {
    pub name: Option<String>,
    pub field_type: FieldType,
    pub id: Option<i16>,
}

impl FieldIdentifier {
    pub fn new(name: impl Into<String>, field_type: FieldType, id: i16) -> Self {
        Self {
            name: Some(name.into()),
            field_type,
            id: Some(id),
        }
    }

    pub fn stop() -> Self {
        Self {
            name: None,
            field_type: FieldType::Stop,
            id: None,
        }
    }

    /// Field id, required for every non-stop field on the encode path.
    pub fn require_id(&self) -> Result<i16> {
        self.id
            .ok_or_else(|| ProtocolError::InvalidData("field id missing".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListIdentifier {
    pub element_type: FieldType,
    pub size: i32,
}

impl ListIdentifier {
    pub fn new(element_type: FieldType, size: i32) -> Self {
        Self { element_type, size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetIdentifier {
    pub element_type: FieldType,
    pub size: i32,
}

impl SetIdentifier {
    pub fn new(element_type: FieldType, size: i32) -> Self {
        Self { element_type, size }
    }
}

/// Map header. Key and value types may be absent for empty compact maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapIdentifier {
    pub key_type: Option<FieldType>,
    pub value_type: Option<FieldType>,
    pub size: i32,
}

impl MapIdentifier {
    pub fn new(key_type: FieldType, value_type: FieldType, size: i32) -> Self {
        Self {
            key_type: Some(key_type),
            value_type: Some(value_type),
            size,
        }
    }
}

/// Decoding half of a protocol.
pub trait InputProtocol {
    fn read_message_begin(&mut self) -> Result<MessageIdentifier>;
    fn read_message_end(&mut self) -> Result<()>;
    fn read_struct_begin(&mut self) -> Result<()>;
    fn read_struct_end(&mut self) -> Result<()>;
    fn read_field_begin(&mut self) -> Result<FieldIdentifier>;
    fn read_field_end(&mut self) -> Result<()>;
    fn read_bool(&mut self) -> Result<bool>;
    fn read_bytes(&mut self) -> Result<Vec<u8>>;
    fn read_i8(&mut self) -> Result<i8>;
    fn read_i16(&mut self) -> Result<i16>;
    fn read_i32(&mut self) -> Result<i32>;
    fn read_i64(&mut self) -> Result<i64>;
    fn read_double(&mut self) -> Result<f64>;
    fn read_string(&mut self) -> Result<String>;
    fn read_list_begin(&mut self) -> Result<ListIdentifier>;
    fn read_list_end(&mut self) -> Result<()>;
    fn read_set_begin(&mut self) -> Result<SetIdentifier>;
    fn read_set_end(&mut self) -> Result<()>;
    fn read_map_begin(&mut self) -> Result<MapIdentifier>;
    fn read_map_end(&mut self) -> Result<()>;

    /// Skip a value of the given type, including any nested values.
    fn skip(&mut self, field_type: FieldType) -> Result<()> {
        skip_to_depth(self, field_type, MAX_SKIP_DEPTH)
    }
}

fn skip_to_depth<P>(input: &mut P, field_type: FieldType, depth: usize) -> Result<()>
where
    P: InputProtocol + ?Sized,
{
    if depth == 0 {
        return Err(ProtocolError::DepthLimit);
    }

    match field_type {
        FieldType::Bool => input.read_bool().map(|_| ()),
        FieldType::I8 => input.read_i8().map(|_| ()),
        FieldType::I16 => input.read_i16().map(|_| ()),
        FieldType::I32 => input.read_i32().map(|_| ()),
        FieldType::I64 => input.read_i64().map(|_| ()),
        FieldType::Double => input.read_double().map(|_| ()),
        FieldType::String => input.read_bytes().map(|_| ()),
        FieldType::Struct => {
            input.read_struct_begin()?;
            loop {
                let field = input.read_field_begin()?;
                if field.field_type == FieldType::Stop {
                    break;
                }
                skip_to_depth(input, field.field_type, depth - 1)?;
                input.read_field_end()?;
            }
            input.read_struct_end()
        }
        FieldType::List => {
            let ident = input.read_list_begin()?;
            for _ in 0..ident.size {
                skip_to_depth(input, ident.element_type, depth - 1)?;
            }
            input.read_list_end()
        }
        FieldType::Set => {
            let ident = input.read_set_begin()?;
            for _ in 0..ident.size {
                skip_to_depth(input, ident.element_type, depth - 1)?;
            }
            input.read_set_end()
        }
        FieldType::Map => {
            let ident = input.read_map_begin()?;
            if ident.size > 0 {
                let key_type = ident.key_type.ok_or_else(|| {
                    ProtocolError::InvalidData("map key type missing".to_string())
                })?;
                let value_type = ident.value_type.ok_or_else(|| {
                    ProtocolError::InvalidData("map value type missing".to_string())
                })?;
                for _ in 0..ident.size {
                    skip_to_depth(input, key_type, depth - 1)?;
                    skip_to_depth(input, value_type, depth - 1)?;
                }
            }
            input.read_map_end()
        }
        FieldType::Stop | FieldType::Void => Err(ProtocolError::InvalidData(format!(
            "cannot skip field type {:?}",
            field_type
        ))),
    }
}

/// Encoding half of a protocol.
pub trait OutputProtocol {
    fn write_message_begin(&mut self, identifier: &MessageIdentifier) -> Result<()>;
    fn write_message_end(&mut self) -> Result<()>;
    fn write_struct_begin(&mut self, identifier: &StructIdentifier) -> Result<()>;
    fn write_struct_end(&mut self) -> Result<()>;
    fn write_field_begin(&mut self, identifier: &FieldIdentifier) -> Result<()>;
    fn write_field_end(&mut self) -> Result<()>;
    fn write_field_stop(&mut self) -> Result<()>;
    fn write_bool(&mut self, b: bool) -> Result<()>;
    fn write_bytes(&mut self, b: &[u8]) -> Result<()>;
    fn write_i8(&mut self, i: i8) -> Result<()>;
    fn write_i16(&mut self, i: i16) -> Result<()>;
    fn write_i32(&mut self, i: i32) -> Result<()>;
    fn write_i64(&mut self, i: i64) -> Result<()>;
    fn write_double(&mut self, d: f64) -> Result<()>;
    fn write_string(&mut self, s: &str) -> Result<()>;
    fn write_list_begin(&mut self, identifier: &ListIdentifier) -> Result<()>;
    fn write_list_end(&mut self) -> Result<()>;
    fn write_set_begin(&mut self, identifier: &SetIdentifier) -> Result<()>;
    fn write_set_end(&mut self) -> Result<()>;
    fn write_map_begin(&mut self, identifier: &MapIdentifier) -> Result<()>;
    fn write_map_end(&mut self) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Constructs codecs for one wire encoding.
pub trait ProtocolFactory: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProtocolKind;

    /// Decoder over one complete message.
    fn reader<'a>(&self, buf: &'a [u8]) -> Result<Box<dyn InputProtocol + 'a>>;

    /// Encoder appending to `buf`.
    fn writer<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn OutputProtocol + 'a>;

    /// Boundary scanner for one message of a stream.
    fn scanner(&self) -> Box<dyn MessageScanner>;

    /// Length of the first complete message in `buf`, or `None` if more bytes
    /// are needed.
    fn message_len(&self, buf: &[u8]) -> Result<Option<usize>> {
        self.scanner().scan(buf)
    }
}

/// A struct that knows how to encode and decode itself.
///
/// Generated service code implements this for argument and result structs.
pub trait Serializable: Sized {
    fn write_to_out_protocol(&self, output: &mut dyn OutputProtocol) -> Result<()>;
    fn read_from_in_protocol(input: &mut dyn InputProtocol) -> Result<Self>;
}

/// Validate a decoded container size.
pub(crate) fn checked_size(size: i64) -> Result<usize> {
    if size < 0 {
        return Err(ProtocolError::NegativeSize(size));
    }
    usize::try_from(size).map_err(|_| ProtocolError::NegativeSize(size))
}

/// Map an end-of-input error to "need more bytes".
pub(crate) fn incomplete_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ProtocolError::UnexpectedEof) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_kind_parses_known_selectors() {
        assert_eq!("binary".parse::<ProtocolKind>().unwrap(), ProtocolKind::Binary);
        assert_eq!("JSON".parse::<ProtocolKind>().unwrap(), ProtocolKind::Json);
        assert_eq!(
            "simplejson".parse::<ProtocolKind>().unwrap(),
            ProtocolKind::SimpleJson
        );
        assert_eq!("compact".parse::<ProtocolKind>().unwrap(), ProtocolKind::Compact);
    }

    #[test]
    fn protocol_kind_rejects_unknown_selectors() {
        let err = "msgpack".parse::<ProtocolKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProtocol(ref s) if s == "msgpack"));

        assert!(ProtocolKind::try_from(4).is_err());
        assert!(ProtocolKind::try_from(-1).is_err());
        assert_eq!(ProtocolKind::try_from(3).unwrap(), ProtocolKind::Compact);
    }

    #[test]
    fn field_type_round_trips_through_u8() {
        for t in [
            FieldType::Bool,
            FieldType::I8,
            FieldType::Double,
            FieldType::I16,
            FieldType::I32,
            FieldType::I64,
            FieldType::String,
            FieldType::Struct,
            FieldType::Map,
            FieldType::Set,
            FieldType::List,
        ] {
            assert_eq!(FieldType::try_from(t as u8).unwrap(), t);
        }
        assert!(FieldType::try_from(5).is_err());
    }

    #[test]
    fn negative_sizes_are_rejected() {
        assert!(matches!(checked_size(-1), Err(ProtocolError::NegativeSize(-1))));
        assert_eq!(checked_size(7).unwrap(), 7);
    }
}
