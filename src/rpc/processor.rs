//! Request dispatch.
//!
//! # Responsibilities
//! - Define the `Processor` seam that generated service code implements
//! - Run one request message through a processor and collect the reply bytes
//! - Helpers for writing replies and application exceptions

use crate::protocol::{
    ApplicationErrorKind, ApplicationException, FieldType, InputProtocol, MessageIdentifier,
    MessageType, OutputProtocol, ProtocolError, ProtocolFactory, Serializable, StructIdentifier,
};

/// Handles one decoded request, writing the reply (if any) to `output`.
///
/// A single instance serves every connection concurrently.
pub trait Processor: Send + Sync {
    fn process(
        &self,
        input: &mut dyn InputProtocol,
        output: &mut dyn OutputProtocol,
    ) -> Result<(), ProtocolError>;
}

impl<F> Processor for F
where
    F: Fn(&mut dyn InputProtocol, &mut dyn OutputProtocol) -> Result<(), ProtocolError>
        + Send
        + Sync,
{
    fn process(
        &self,
        input: &mut dyn InputProtocol,
        output: &mut dyn OutputProtocol,
    ) -> Result<(), ProtocolError> {
        self(input, output)
    }
}

/// Decode `request`, run it through `processor` and return the encoded
/// reply. An empty reply means the call was oneway.
pub fn dispatch(
    protocol: &dyn ProtocolFactory,
    processor: &dyn Processor,
    request: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut input = protocol.reader(request)?;
    let mut response = Vec::new();
    {
        let mut output = protocol.writer(&mut response);
        processor.process(&mut *input, &mut *output)?;
    }
    Ok(response)
}

/// Write a complete `Reply` message carrying `result`.
pub fn write_reply<T: Serializable>(
    output: &mut dyn OutputProtocol,
    name: &str,
    sequence_number: i32,
    result: &T,
) -> Result<(), ProtocolError> {
    output.write_message_begin(&MessageIdentifier::new(
        name,
        MessageType::Reply,
        sequence_number,
    ))?;
    result.write_to_out_protocol(output)?;
    output.write_message_end()?;
    output.flush()
}

/// Write a complete `Exception` message.
pub fn write_exception(
    output: &mut dyn OutputProtocol,
    name: &str,
    sequence_number: i32,
    exception: &ApplicationException,
) -> Result<(), ProtocolError> {
    output.write_message_begin(&MessageIdentifier::new(
        name,
        MessageType::Exception,
        sequence_number,
    ))?;
    exception.write_to_out_protocol(output)?;
    output.write_message_end()?;
    output.flush()
}

/// Consume the arguments of a call nobody handles and answer with an
/// `UnknownMethod` exception.
pub fn reject_unknown_method(
    input: &mut dyn InputProtocol,
    output: &mut dyn OutputProtocol,
    call: &MessageIdentifier,
) -> Result<(), ProtocolError> {
    input.skip(FieldType::Struct)?;
    input.read_message_end()?;
    if call.message_type == MessageType::OneWay {
        return Ok(());
    }
    let exception = ApplicationException::new(
        ApplicationErrorKind::UnknownMethod,
        format!("unknown method {}", call.name),
    );
    write_exception(output, &call.name, call.sequence_number, &exception)
}

/// Struct with no fields, the arguments or result of a `void f()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Empty;

impl Serializable for Empty {
    fn write_to_out_protocol(&self, output: &mut dyn OutputProtocol) -> Result<(), ProtocolError> {
        output.write_struct_begin(&StructIdentifier::new("Empty"))?;
        output.write_field_stop()?;
        output.write_struct_end()
    }

    fn read_from_in_protocol(input: &mut dyn InputProtocol) -> Result<Self, ProtocolError> {
        input.read_struct_begin()?;
        loop {
            let field = input.read_field_begin()?;
            if field.field_type == FieldType::Stop {
                break;
            }
            input.skip(field.field_type)?;
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::binary::BinaryProtocolFactory;

    fn call_bytes(protocol: &dyn ProtocolFactory, name: &str, kind: MessageType) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut out = protocol.writer(&mut buf);
            out.write_message_begin(&MessageIdentifier::new(name, kind, 11))
                .unwrap();
            Empty.write_to_out_protocol(&mut *out).unwrap();
            out.write_message_end().unwrap();
        }
        buf
    }

    fn reject_everything(
        input: &mut dyn InputProtocol,
        output: &mut dyn OutputProtocol,
    ) -> Result<(), ProtocolError> {
        let call = input.read_message_begin()?;
        reject_unknown_method(input, output, &call)
    }

    #[test]
    fn unknown_methods_get_an_exception_reply() {
        let protocol = BinaryProtocolFactory;
        let request = call_bytes(&protocol, "frobnicate", MessageType::Call);

        let response = dispatch(&protocol, &reject_everything, &request).unwrap();

        let mut input = protocol.reader(&response).unwrap();
        let ident = input.read_message_begin().unwrap();
        assert_eq!(ident.message_type, MessageType::Exception);
        assert_eq!(ident.name, "frobnicate");
        assert_eq!(ident.sequence_number, 11);
        let exception = ApplicationException::read_from_in_protocol(&mut *input).unwrap();
        assert_eq!(exception.kind, ApplicationErrorKind::UnknownMethod);
    }

    #[test]
    fn oneway_calls_produce_no_reply() {
        let protocol = BinaryProtocolFactory;
        let request = call_bytes(&protocol, "fire", MessageType::OneWay);
        let response = dispatch(&protocol, &reject_everything, &request).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn malformed_requests_are_protocol_errors() {
        let protocol = BinaryProtocolFactory;
        assert!(dispatch(&protocol, &reject_everything, &[0x80, 0x01]).is_err());
    }
}
