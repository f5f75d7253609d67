//! Simple JSON protocol.
//!
//! Output is plain JSON keyed by field name and meant for humans and for
//! non-Thrift consumers. The encoding drops field ids and types, so the reader
//! can recover the message envelope and scalar values but reports every struct
//! as empty.

use std::collections::VecDeque;

use serde_json::Value;

use super::json::JsonWriter;
use super::scan::{JsonScanner, MessageScanner};
use super::{
    checked_size, FieldIdentifier, InputProtocol, ListIdentifier, MapIdentifier,
    MessageIdentifier, MessageType, OutputProtocol, ProtocolError, ProtocolFactory, ProtocolKind,
    Result, SetIdentifier, StructIdentifier,
};

/// Encoder for the simple JSON protocol.
#[derive(Debug)]
pub struct SimpleJsonOutputProtocol<'a> {
    writer: JsonWriter<'a>,
}

impl<'a> SimpleJsonOutputProtocol<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self {
            writer: JsonWriter::new(buf),
        }
    }
}

impl OutputProtocol for SimpleJsonOutputProtocol<'_> {
    fn write_message_begin(&mut self, identifier: &MessageIdentifier) -> Result<()> {
        self.writer.array_begin();
        self.writer.string(&identifier.name)?;
        self.writer.integer(identifier.message_type as i64);
        self.writer.integer(i64::from(identifier.sequence_number));
        Ok(())
    }

    fn write_message_end(&mut self) -> Result<()> {
        self.writer.array_end()
    }

    fn write_struct_begin(&mut self, _identifier: &StructIdentifier) -> Result<()> {
        self.writer.object_begin();
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<()> {
        self.writer.object_end()
    }

    fn write_field_begin(&mut self, identifier: &FieldIdentifier) -> Result<()> {
        match &identifier.name {
            Some(name) => self.writer.string(name),
            None => self.writer.string(&identifier.require_id()?.to_string()),
        }
    }

    fn write_field_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_bool(&mut self, b: bool) -> Result<()> {
        self.writer.boolean(b);
        Ok(())
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.writer.base64(b);
        Ok(())
    }

    fn write_i8(&mut self, i: i8) -> Result<()> {
        self.writer.integer(i64::from(i));
        Ok(())
    }

    fn write_i16(&mut self, i: i16) -> Result<()> {
        self.writer.integer(i64::from(i));
        Ok(())
    }

    fn write_i32(&mut self, i: i32) -> Result<()> {
        self.writer.integer(i64::from(i));
        Ok(())
    }

    fn write_i64(&mut self, i: i64) -> Result<()> {
        self.writer.integer(i);
        Ok(())
    }

    fn write_double(&mut self, d: f64) -> Result<()> {
        self.writer.double(d);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.writer.string(s)
    }

    fn write_list_begin(&mut self, identifier: &ListIdentifier) -> Result<()> {
        checked_size(identifier.size as i64)?;
        self.writer.array_begin();
        self.writer.integer(identifier.element_type as i64);
        self.writer.integer(i64::from(identifier.size));
        Ok(())
    }

    fn write_list_end(&mut self) -> Result<()> {
        self.writer.array_end()
    }

    fn write_set_begin(&mut self, identifier: &SetIdentifier) -> Result<()> {
        checked_size(identifier.size as i64)?;
        self.writer.array_begin();
        self.writer.integer(identifier.element_type as i64);
        self.writer.integer(i64::from(identifier.size));
        Ok(())
    }

    fn write_set_end(&mut self) -> Result<()> {
        self.writer.array_end()
    }

    fn write_map_begin(&mut self, identifier: &MapIdentifier) -> Result<()> {
        checked_size(identifier.size as i64)?;
        self.writer.array_begin();
        self.writer
            .integer(identifier.key_type.map_or(0, |t| t as i64));
        self.writer
            .integer(identifier.value_type.map_or(0, |t| t as i64));
        self.writer.integer(i64::from(identifier.size));
        self.writer.object_begin();
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<()> {
        self.writer.object_end()?;
        self.writer.array_end()
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Decoder for the simple JSON protocol.
///
/// Reads the envelope and scalars; structs decode as empty and containers are
/// rejected because their element types are not recoverable.
#[derive(Debug)]
pub struct SimpleJsonInputProtocol {
    root: Option<Value>,
    frames: Vec<VecDeque<Value>>,
}

impl SimpleJsonInputProtocol {
    pub fn new(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            root: Some(serde_json::from_slice(buf)?),
            frames: Vec::new(),
        })
    }

    fn next_value(&mut self) -> Result<Value> {
        self.frames
            .last_mut()
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ProtocolError::InvalidData("no json value to read".to_string()))
    }

    fn pop_frame(&mut self) -> Result<()> {
        self.frames
            .pop()
            .map(|_| ())
            .ok_or_else(|| ProtocolError::InvalidData("unbalanced json container".to_string()))
    }

    fn next_integer(&mut self) -> Result<i64> {
        let value = self.next_value()?;
        value
            .as_i64()
            .ok_or_else(|| ProtocolError::InvalidData(format!("expected integer, found {}", value)))
    }

    fn next_narrow<T: TryFrom<i64>>(&mut self) -> Result<T> {
        let value = self.next_integer()?;
        T::try_from(value)
            .map_err(|_| ProtocolError::InvalidData(format!("{} is out of range", value)))
    }
}

impl InputProtocol for SimpleJsonInputProtocol {
    fn read_message_begin(&mut self) -> Result<MessageIdentifier> {
        let items = match self.root.take() {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ProtocolError::InvalidData(format!(
                    "expected json array, found {}",
                    other
                )))
            }
            None => {
                return Err(ProtocolError::InvalidData(
                    "message already read".to_string(),
                ))
            }
        };
        self.frames.push(items.into());

        let name = self.read_string()?;
        let message_type = MessageType::try_from(self.next_narrow::<u8>()?)?;
        let sequence_number = self.next_narrow()?;
        Ok(MessageIdentifier::new(name, message_type, sequence_number))
    }

    fn read_message_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_struct_begin(&mut self) -> Result<()> {
        match self.next_value()? {
            Value::Object(_) => {
                self.frames.push(VecDeque::new());
                Ok(())
            }
            other => Err(ProtocolError::InvalidData(format!(
                "expected json object, found {}",
                other
            ))),
        }
    }

    fn read_struct_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_field_begin(&mut self) -> Result<FieldIdentifier> {
        Ok(FieldIdentifier::stop())
    }

    fn read_field_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.next_value()? {
            Value::Bool(b) => Ok(b),
            other => Err(ProtocolError::InvalidData(format!(
                "expected json boolean, found {}",
                other
            ))),
        }
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        Err(ProtocolError::NotImplemented("read_bytes"))
    }

    fn read_i8(&mut self) -> Result<i8> {
        self.next_narrow()
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.next_narrow()
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.next_narrow()
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.next_integer()
    }

    fn read_double(&mut self) -> Result<f64> {
        let value = self.next_value()?;
        value
            .as_f64()
            .ok_or_else(|| ProtocolError::InvalidData(format!("expected number, found {}", value)))
    }

    fn read_string(&mut self) -> Result<String> {
        match self.next_value()? {
            Value::String(s) => Ok(s),
            other => Err(ProtocolError::InvalidData(format!(
                "expected json string, found {}",
                other
            ))),
        }
    }

    fn read_list_begin(&mut self) -> Result<ListIdentifier> {
        Err(ProtocolError::NotImplemented("read_list_begin"))
    }

    fn read_list_end(&mut self) -> Result<()> {
        Err(ProtocolError::NotImplemented("read_list_end"))
    }

    fn read_set_begin(&mut self) -> Result<SetIdentifier> {
        Err(ProtocolError::NotImplemented("read_set_begin"))
    }

    fn read_set_end(&mut self) -> Result<()> {
        Err(ProtocolError::NotImplemented("read_set_end"))
    }

    fn read_map_begin(&mut self) -> Result<MapIdentifier> {
        Err(ProtocolError::NotImplemented("read_map_begin"))
    }

    fn read_map_end(&mut self) -> Result<()> {
        Err(ProtocolError::NotImplemented("read_map_end"))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleJsonProtocolFactory;

impl ProtocolFactory for SimpleJsonProtocolFactory {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::SimpleJson
    }

    fn reader<'a>(&self, buf: &'a [u8]) -> Result<Box<dyn InputProtocol + 'a>> {
        Ok(Box::new(SimpleJsonInputProtocol::new(buf)?))
    }

    fn writer<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn OutputProtocol + 'a> {
        Box::new(SimpleJsonOutputProtocol::new(buf))
    }

    fn scanner(&self) -> Box<dyn MessageScanner> {
        Box::<JsonScanner>::default()
    }
}
