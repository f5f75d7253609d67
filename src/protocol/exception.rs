//! Application-level exception carried in `Exception` replies.

use std::fmt;

use thiserror::Error;

use super::{
    FieldIdentifier, FieldType, InputProtocol, OutputProtocol, Result, Serializable,
    StructIdentifier,
};

/// Reason code of an [`ApplicationException`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationErrorKind {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    BadSequenceId = 4,
    MissingResult = 5,
    InternalError = 6,
    ProtocolError = 7,
    InvalidTransform = 8,
    InvalidProtocol = 9,
    UnsupportedClientType = 10,
}

impl From<i32> for ApplicationErrorKind {
    fn from(code: i32) -> Self {
        match code {
            1 => ApplicationErrorKind::UnknownMethod,
            2 => ApplicationErrorKind::InvalidMessageType,
            3 => ApplicationErrorKind::WrongMethodName,
            4 => ApplicationErrorKind::BadSequenceId,
            5 => ApplicationErrorKind::MissingResult,
            6 => ApplicationErrorKind::InternalError,
            7 => ApplicationErrorKind::ProtocolError,
            8 => ApplicationErrorKind::InvalidTransform,
            9 => ApplicationErrorKind::InvalidProtocol,
            10 => ApplicationErrorKind::UnsupportedClientType,
            _ => ApplicationErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ApplicationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApplicationErrorKind::Unknown => "unknown",
            ApplicationErrorKind::UnknownMethod => "unknown method",
            ApplicationErrorKind::InvalidMessageType => "invalid message type",
            ApplicationErrorKind::WrongMethodName => "wrong method name",
            ApplicationErrorKind::BadSequenceId => "bad sequence id",
            ApplicationErrorKind::MissingResult => "missing result",
            ApplicationErrorKind::InternalError => "internal error",
            ApplicationErrorKind::ProtocolError => "protocol error",
            ApplicationErrorKind::InvalidTransform => "invalid transform",
            ApplicationErrorKind::InvalidProtocol => "invalid protocol",
            ApplicationErrorKind::UnsupportedClientType => "unsupported client type",
        };
        f.write_str(text)
    }
}

/// Error raised by the remote side (or by reply validation) rather than by the
/// wire layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApplicationException {
    pub kind: ApplicationErrorKind,
    pub message: String,
}

impl ApplicationException {
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Serializable for ApplicationException {
    fn write_to_out_protocol(&self, output: &mut dyn OutputProtocol) -> Result<()> {
        output.write_struct_begin(&StructIdentifier::new("TApplicationException"))?;
        output.write_field_begin(&FieldIdentifier::new("message", FieldType::String, 1))?;
        output.write_string(&self.message)?;
        output.write_field_end()?;
        output.write_field_begin(&FieldIdentifier::new("type", FieldType::I32, 2))?;
        output.write_i32(self.kind as i32)?;
        output.write_field_end()?;
        output.write_field_stop()?;
        output.write_struct_end()
    }

    fn read_from_in_protocol(input: &mut dyn InputProtocol) -> Result<Self> {
        let mut message = String::new();
        let mut kind = ApplicationErrorKind::Unknown;

        input.read_struct_begin()?;
        loop {
            let field = input.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, FieldType::Stop) => break,
                (Some(1), FieldType::String) => message = input.read_string()?,
                (Some(2), FieldType::I32) => kind = ApplicationErrorKind::from(input.read_i32()?),
                (_, other) => input.skip(other)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;

        Ok(Self { kind, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::binary::{BinaryInputProtocol, BinaryOutputProtocol};
    use crate::protocol::compact::{CompactInputProtocol, CompactOutputProtocol};

    #[test]
    fn decodes_what_it_encodes_in_binary_and_compact() {
        let exception =
            ApplicationException::new(ApplicationErrorKind::UnknownMethod, "no such method: frob");

        let mut buf = Vec::new();
        exception
            .write_to_out_protocol(&mut BinaryOutputProtocol::new(&mut buf))
            .unwrap();
        let decoded =
            ApplicationException::read_from_in_protocol(&mut BinaryInputProtocol::new(&buf))
                .unwrap();
        assert_eq!(decoded, exception);

        let mut buf = Vec::new();
        exception
            .write_to_out_protocol(&mut CompactOutputProtocol::new(&mut buf))
            .unwrap();
        let decoded =
            ApplicationException::read_from_in_protocol(&mut CompactInputProtocol::new(&buf))
                .unwrap();
        assert_eq!(decoded, exception);
    }

    #[test]
    fn unknown_codes_map_to_unknown() {
        assert_eq!(ApplicationErrorKind::from(42), ApplicationErrorKind::Unknown);
        assert_eq!(ApplicationErrorKind::from(4), ApplicationErrorKind::BadSequenceId);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let exception = ApplicationException::new(ApplicationErrorKind::InternalError, "boom");
        assert_eq!(exception.to_string(), "internal error: boom");
    }
}
