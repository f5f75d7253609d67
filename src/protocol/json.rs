//! TJSON protocol and the JSON writer shared with the simple JSON encoding.
//!
//! # Wire Shape
//! ```text
//! message  [1,"name",type,seq,{struct}]
//! struct   {"<id>":{"<tname>":value},...}
//! list/set ["<tname>",size,elem,...]
//! map      ["<ktname>","<vtname>",size,{"key":value,...}]
//! ```
//!
//! Booleans are written as 1/0, binary as base64, and numbers that appear in
//! object-key position are quoted. The reader parses one complete message into
//! a `serde_json::Value` tree and walks it with a frame stack.

use std::collections::VecDeque;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use serde::de::IgnoredAny;
use serde_json::Value;

use super::scan::{JsonScanner, MessageScanner};
use super::{
    checked_size, FieldIdentifier, FieldType, InputProtocol, ListIdentifier, MapIdentifier,
    MessageIdentifier, MessageType, OutputProtocol, ProtocolError, ProtocolFactory, ProtocolKind,
    Result, SetIdentifier, StructIdentifier,
};

const VERSION: i64 = 1;

fn type_name(field_type: FieldType) -> Result<&'static str> {
    match field_type {
        FieldType::Bool => Ok("tf"),
        FieldType::I8 => Ok("i8"),
        FieldType::I16 => Ok("i16"),
        FieldType::I32 => Ok("i32"),
        FieldType::I64 => Ok("i64"),
        FieldType::Double => Ok("dbl"),
        FieldType::String => Ok("str"),
        FieldType::Struct => Ok("rec"),
        FieldType::Map => Ok("map"),
        FieldType::Set => Ok("set"),
        FieldType::List => Ok("lst"),
        FieldType::Stop | FieldType::Void => Err(ProtocolError::InvalidData(format!(
            "{:?} has no json type name",
            field_type
        ))),
    }
}

fn type_from_name(name: &str) -> Result<FieldType> {
    match name {
        "tf" => Ok(FieldType::Bool),
        "i8" => Ok(FieldType::I8),
        "i16" => Ok(FieldType::I16),
        "i32" => Ok(FieldType::I32),
        "i64" => Ok(FieldType::I64),
        "dbl" => Ok(FieldType::Double),
        "str" => Ok(FieldType::String),
        "rec" => Ok(FieldType::Struct),
        "map" => Ok(FieldType::Map),
        "set" => Ok(FieldType::Set),
        "lst" => Ok(FieldType::List),
        other => Err(ProtocolError::InvalidData(format!(
            "unknown json type name {:?}",
            other
        ))),
    }
}

/// Separator state for the value currently being written.
#[derive(Debug, Clone, Copy)]
enum Context {
    Base,
    List { first: bool },
    /// Object members; `colon` is set while the next value is a member value.
    Pair { first: bool, colon: bool },
}

/// Streaming JSON writer with Thrift's separator and key-quoting rules.
#[derive(Debug)]
pub(crate) struct JsonWriter<'a> {
    buf: &'a mut Vec<u8>,
    stack: Vec<Context>,
}

impl<'a> JsonWriter<'a> {
    pub(crate) fn new(buf: &'a mut Vec<u8>) -> Self {
        Self {
            buf,
            stack: vec![Context::Base],
        }
    }

    fn context(&mut self) -> &mut Context {
        // The base context is never popped.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Emit the separator owed before the next value.
    fn separate(&mut self) {
        let sep = match self.context() {
            Context::Base => None,
            Context::List { first } => {
                if *first {
                    *first = false;
                    None
                } else {
                    Some(b',')
                }
            }
            Context::Pair { first, colon } => {
                if *first {
                    *first = false;
                    *colon = true;
                    None
                } else {
                    let sep = if *colon { b':' } else { b',' };
                    *colon = !*colon;
                    Some(sep)
                }
            }
        };
        if let Some(sep) = sep {
            self.buf.push(sep);
        }
    }

    /// Numbers written as object keys must be quoted.
    fn in_key_position(&self) -> bool {
        matches!(self.stack.last(), Some(Context::Pair { colon: true, .. }))
    }

    fn pop_context(&mut self) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(ProtocolError::InvalidData(
                "unbalanced json container".to_string(),
            ));
        }
        self.stack.pop();
        Ok(())
    }

    pub(crate) fn object_begin(&mut self) {
        self.separate();
        self.buf.push(b'{');
        self.stack.push(Context::Pair {
            first: true,
            colon: false,
        });
    }

    pub(crate) fn object_end(&mut self) -> Result<()> {
        self.pop_context()?;
        self.buf.push(b'}');
        Ok(())
    }

    pub(crate) fn array_begin(&mut self) {
        self.separate();
        self.buf.push(b'[');
        self.stack.push(Context::List { first: true });
    }

    pub(crate) fn array_end(&mut self) -> Result<()> {
        self.pop_context()?;
        self.buf.push(b']');
        Ok(())
    }

    pub(crate) fn string(&mut self, s: &str) -> Result<()> {
        self.separate();
        serde_json::to_writer(&mut *self.buf, s)?;
        Ok(())
    }

    pub(crate) fn integer(&mut self, i: i64) {
        self.separate();
        let quote = self.in_key_position();
        if quote {
            self.buf.push(b'"');
        }
        self.buf.extend_from_slice(i.to_string().as_bytes());
        if quote {
            self.buf.push(b'"');
        }
    }

    pub(crate) fn double(&mut self, d: f64) {
        self.separate();
        let special = if d.is_nan() {
            Some("NaN")
        } else if d == f64::INFINITY {
            Some("Infinity")
        } else if d == f64::NEG_INFINITY {
            Some("-Infinity")
        } else {
            None
        };
        match special {
            Some(text) => {
                self.buf.push(b'"');
                self.buf.extend_from_slice(text.as_bytes());
                self.buf.push(b'"');
            }
            None => {
                let quote = self.in_key_position();
                if quote {
                    self.buf.push(b'"');
                }
                self.buf.extend_from_slice(format!("{:?}", d).as_bytes());
                if quote {
                    self.buf.push(b'"');
                }
            }
        }
    }

    pub(crate) fn boolean(&mut self, b: bool) {
        self.separate();
        let text: &[u8] = if b { b"true" } else { b"false" };
        self.buf.extend_from_slice(text);
    }

    pub(crate) fn base64(&mut self, bytes: &[u8]) {
        self.separate();
        self.buf.push(b'"');
        self.buf.extend_from_slice(STANDARD.encode(bytes).as_bytes());
        self.buf.push(b'"');
    }
}

/// Length of the first complete JSON value in `buf`.
pub(crate) fn json_message_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<IgnoredAny>();
    match values.next() {
        None => Ok(None),
        Some(Ok(_)) => Ok(Some(values.byte_offset())),
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(e.into()),
    }
}

/// Encoder for the TJSON protocol.
#[derive(Debug)]
pub struct JsonOutputProtocol<'a> {
    writer: JsonWriter<'a>,
}

impl<'a> JsonOutputProtocol<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self {
            writer: JsonWriter::new(buf),
        }
    }

    fn write_collection_begin(&mut self, element_type: FieldType, size: i32) -> Result<()> {
        checked_size(size as i64)?;
        self.writer.array_begin();
        self.writer.string(type_name(element_type)?)?;
        self.writer.integer(i64::from(size));
        Ok(())
    }
}

impl OutputProtocol for JsonOutputProtocol<'_> {
    fn write_message_begin(&mut self, identifier: &MessageIdentifier) -> Result<()> {
        self.writer.array_begin();
        self.writer.integer(VERSION);
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
        let id = identifier.require_id()?;
        self.writer.integer(i64::from(id));
        self.writer.object_begin();
        self.writer.string(type_name(identifier.field_type)?)
    }

    fn write_field_end(&mut self) -> Result<()> {
        self.writer.object_end()
    }

    fn write_field_stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_bool(&mut self, b: bool) -> Result<()> {
        self.writer.integer(i64::from(b));
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
        self.write_collection_begin(identifier.element_type, identifier.size)
    }

    fn write_list_end(&mut self) -> Result<()> {
        self.writer.array_end()
    }

    fn write_set_begin(&mut self, identifier: &SetIdentifier) -> Result<()> {
        self.write_collection_begin(identifier.element_type, identifier.size)
    }

    fn write_set_end(&mut self) -> Result<()> {
        self.writer.array_end()
    }

    fn write_map_begin(&mut self, identifier: &MapIdentifier) -> Result<()> {
        checked_size(identifier.size as i64)?;
        let key_type = identifier
            .key_type
            .ok_or_else(|| ProtocolError::InvalidData("map key type missing".to_string()))?;
        let value_type = identifier
            .value_type
            .ok_or_else(|| ProtocolError::InvalidData("map value type missing".to_string()))?;
        self.writer.array_begin();
        self.writer.string(type_name(key_type)?)?;
        self.writer.string(type_name(value_type)?)?;
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

#[derive(Debug)]
enum Frame {
    Values(VecDeque<Value>),
    Fields(VecDeque<(String, Value)>),
}

/// Decoder for the TJSON protocol.
#[derive(Debug)]
pub struct JsonInputProtocol {
    root: Option<Value>,
    frames: Vec<Frame>,
}

impl JsonInputProtocol {
    pub fn new(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            root: Some(serde_json::from_slice(buf)?),
            frames: Vec::new(),
        })
    }

    fn next_value(&mut self) -> Result<Value> {
        match self.frames.last_mut() {
            Some(Frame::Values(values)) => values.pop_front().ok_or_else(|| {
                ProtocolError::InvalidData("json container has no more values".to_string())
            }),
            Some(Frame::Fields(_)) => Err(ProtocolError::InvalidData(
                "expected a field header, not a value".to_string(),
            )),
            None => Err(ProtocolError::InvalidData(
                "value read outside a message".to_string(),
            )),
        }
    }

    fn pop_frame(&mut self) -> Result<()> {
        self.frames
            .pop()
            .map(|_| ())
            .ok_or_else(|| ProtocolError::InvalidData("unbalanced json container".to_string()))
    }

    fn next_array(&mut self) -> Result<VecDeque<Value>> {
        match self.next_value()? {
            Value::Array(items) => Ok(items.into()),
            other => Err(unexpected("array", &other)),
        }
    }

    fn next_integer(&mut self) -> Result<i64> {
        integer(self.next_value()?)
    }

    fn read_collection_header(&mut self) -> Result<(FieldType, i32)> {
        let mut items = self.next_array()?;
        let element_type = type_from_name(&string(pop(&mut items)?)?)?;
        let size = integer(pop(&mut items)?)?;
        if checked_size(size)? != items.len() {
            return Err(ProtocolError::InvalidData(format!(
                "list declares {} elements but holds {}",
                size,
                items.len()
            )));
        }
        self.frames.push(Frame::Values(items));
        Ok((element_type, narrow(size)?))
    }
}

fn unexpected(expected: &str, found: &Value) -> ProtocolError {
    ProtocolError::InvalidData(format!("expected json {}, found {}", expected, found))
}

fn pop(items: &mut VecDeque<Value>) -> Result<Value> {
    items
        .pop_front()
        .ok_or_else(|| ProtocolError::InvalidData("json array too short".to_string()))
}

fn string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(unexpected("string", &other)),
    }
}

/// Integers may arrive quoted when they were written as map keys.
fn integer(value: Value) -> Result<i64> {
    match &value {
        Value::Number(n) => n.as_i64().ok_or_else(|| unexpected("integer", &value)),
        Value::String(s) => s.parse().map_err(|_| unexpected("integer", &value)),
        _ => Err(unexpected("integer", &value)),
    }
}

fn narrow<T: TryFrom<i64>>(value: i64) -> Result<T> {
    T::try_from(value)
        .map_err(|_| ProtocolError::InvalidData(format!("{} is out of range", value)))
}

impl InputProtocol for JsonInputProtocol {
    fn read_message_begin(&mut self) -> Result<MessageIdentifier> {
        let root = self
            .root
            .take()
            .ok_or_else(|| ProtocolError::InvalidData("message already read".to_string()))?;
        let mut items: VecDeque<Value> = match root {
            Value::Array(items) => items.into(),
            other => return Err(unexpected("array", &other)),
        };

        let version = integer(pop(&mut items)?)?;
        if version != VERSION {
            return Err(ProtocolError::BadVersion(version as u32));
        }
        let name = string(pop(&mut items)?)?;
        let message_type = MessageType::try_from(narrow::<u8>(integer(pop(&mut items)?)?)?)?;
        let sequence_number = narrow(integer(pop(&mut items)?)?)?;

        self.frames.push(Frame::Values(items));
        Ok(MessageIdentifier::new(name, message_type, sequence_number))
    }

    fn read_message_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_struct_begin(&mut self) -> Result<()> {
        match self.next_value()? {
            Value::Object(members) => {
                self.frames.push(Frame::Fields(members.into_iter().collect()));
                Ok(())
            }
            other => Err(unexpected("object", &other)),
        }
    }

    fn read_struct_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_field_begin(&mut self) -> Result<FieldIdentifier> {
        let (key, value) = match self.frames.last_mut() {
            Some(Frame::Fields(fields)) => match fields.pop_front() {
                Some(member) => member,
                None => return Ok(FieldIdentifier::stop()),
            },
            _ => {
                return Err(ProtocolError::InvalidData(
                    "field header read outside a struct".to_string(),
                ))
            }
        };

        let id: i16 = key
            .parse()
            .map_err(|_| ProtocolError::InvalidData(format!("bad field id {:?}", key)))?;
        let (tname, inner) = match value {
            Value::Object(typed) if typed.len() == 1 => typed
                .into_iter()
                .next()
                .ok_or_else(|| ProtocolError::InvalidData("empty field value".to_string()))?,
            other => return Err(unexpected("single-member object", &other)),
        };

        self.frames.push(Frame::Values(VecDeque::from([inner])));
        Ok(FieldIdentifier {
            name: None,
            field_type: type_from_name(&tname)?,
            id: Some(id),
        })
    }

    fn read_field_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.next_value()? {
            Value::Bool(b) => Ok(b),
            other => Ok(integer(other)? != 0),
        }
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let encoded = string(self.next_value()?)?;
        // Some writers omit the padding.
        STANDARD
            .decode(&encoded)
            .or_else(|_| STANDARD_NO_PAD.decode(&encoded))
            .map_err(|e| ProtocolError::InvalidData(format!("bad base64: {}", e)))
    }

    fn read_i8(&mut self) -> Result<i8> {
        narrow(self.next_integer()?)
    }

    fn read_i16(&mut self) -> Result<i16> {
        narrow(self.next_integer()?)
    }

    fn read_i32(&mut self) -> Result<i32> {
        narrow(self.next_integer()?)
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.next_integer()
    }

    fn read_double(&mut self) -> Result<f64> {
        let value = self.next_value()?;
        match &value {
            Value::Number(n) => n.as_f64().ok_or_else(|| unexpected("number", &value)),
            Value::String(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => other.parse().map_err(|_| unexpected("number", &value)),
            },
            _ => Err(unexpected("number", &value)),
        }
    }

    fn read_string(&mut self) -> Result<String> {
        string(self.next_value()?)
    }

    fn read_list_begin(&mut self) -> Result<ListIdentifier> {
        let (element_type, size) = self.read_collection_header()?;
        Ok(ListIdentifier::new(element_type, size))
    }

    fn read_list_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_set_begin(&mut self) -> Result<SetIdentifier> {
        let (element_type, size) = self.read_collection_header()?;
        Ok(SetIdentifier::new(element_type, size))
    }

    fn read_set_end(&mut self) -> Result<()> {
        self.pop_frame()
    }

    fn read_map_begin(&mut self) -> Result<MapIdentifier> {
        let mut items = self.next_array()?;
        let key_type = type_from_name(&string(pop(&mut items)?)?)?;
        let value_type = type_from_name(&string(pop(&mut items)?)?)?;
        let size = integer(pop(&mut items)?)?;
        let members = match pop(&mut items)? {
            Value::Object(members) => members,
            other => return Err(unexpected("object", &other)),
        };
        if checked_size(size)? != members.len() {
            return Err(ProtocolError::InvalidData(format!(
                "map declares {} entries but holds {}",
                size,
                members.len()
            )));
        }

        // Keys are always strings on the wire; scalar readers accept quoted values.
        let mut entries = VecDeque::with_capacity(members.len() * 2);
        for (key, value) in members {
            entries.push_back(Value::String(key));
            entries.push_back(value);
        }
        self.frames.push(Frame::Values(entries));
        Ok(MapIdentifier::new(key_type, value_type, narrow(size)?))
    }

    fn read_map_end(&mut self) -> Result<()> {
        self.pop_frame()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProtocolFactory;

impl ProtocolFactory for JsonProtocolFactory {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Json
    }

    fn reader<'a>(&self, buf: &'a [u8]) -> Result<Box<dyn InputProtocol + 'a>> {
        Ok(Box::new(JsonInputProtocol::new(buf)?))
    }

    fn writer<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn OutputProtocol + 'a> {
        Box::new(JsonOutputProtocol::new(buf))
    }

    fn scanner(&self) -> Box<dyn MessageScanner> {
        Box::<JsonScanner>::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<F>(f: F) -> String
    where
        F: FnOnce(&mut JsonOutputProtocol<'_>),
    {
        let mut buf = Vec::new();
        f(&mut JsonOutputProtocol::new(&mut buf));
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn message_with_fields_matches_wire_shape() {
        let text = encode(|out| {
            out.write_message_begin(&MessageIdentifier::new("echo", MessageType::Call, 3))
                .unwrap();
            out.write_struct_begin(&StructIdentifier::new("args")).unwrap();
            out.write_field_begin(&FieldIdentifier::new("msg", FieldType::String, 1))
                .unwrap();
            out.write_string("hi").unwrap();
            out.write_field_end().unwrap();
            out.write_field_begin(&FieldIdentifier::new("loud", FieldType::Bool, 2))
                .unwrap();
            out.write_bool(true).unwrap();
            out.write_field_end().unwrap();
            out.write_field_stop().unwrap();
            out.write_struct_end().unwrap();
            out.write_message_end().unwrap();
        });
        assert_eq!(text, r#"[1,"echo",1,3,{"1":{"str":"hi"},"2":{"tf":1}}]"#);
    }

    #[test]
    fn map_keys_are_quoted() {
        let text = encode(|out| {
            out.write_map_begin(&MapIdentifier::new(FieldType::I32, FieldType::Double, 2))
                .unwrap();
            out.write_i32(1).unwrap();
            out.write_double(0.5).unwrap();
            out.write_i32(2).unwrap();
            out.write_double(f64::NAN).unwrap();
            out.write_map_end().unwrap();
        });
        assert_eq!(text, r#"["i32","dbl",2,{"1":0.5,"2":"NaN"}]"#);
    }

    #[test]
    fn reads_nested_containers() {
        let text = r#"[1,"sum",2,9,{"0":{"lst":["i64",3,1,2,3]},"1":{"map":["str","tf",1,{"k":0}]}}]"#;
        let mut input = JsonInputProtocol::new(text.as_bytes()).unwrap();
        let ident = input.read_message_begin().unwrap();
        assert_eq!(ident, MessageIdentifier::new("sum", MessageType::Reply, 9));

        input.read_struct_begin().unwrap();
        let mut seen = Vec::new();
        loop {
            let field = input.read_field_begin().unwrap();
            match field.field_type {
                FieldType::Stop => break,
                FieldType::List => {
                    let list = input.read_list_begin().unwrap();
                    let values: Vec<i64> =
                        (0..list.size).map(|_| input.read_i64().unwrap()).collect();
                    input.read_list_end().unwrap();
                    assert_eq!(values, vec![1, 2, 3]);
                }
                FieldType::Map => {
                    let map = input.read_map_begin().unwrap();
                    assert_eq!(map.size, 1);
                    assert_eq!(input.read_string().unwrap(), "k");
                    assert!(!input.read_bool().unwrap());
                    input.read_map_end().unwrap();
                }
                other => panic!("unexpected {:?}", other),
            }
            seen.push(field.id);
            input.read_field_end().unwrap();
        }
        input.read_struct_end().unwrap();
        input.read_message_end().unwrap();
        seen.sort();
        assert_eq!(seen, vec![Some(0), Some(1)]);
    }

    #[test]
    fn skip_walks_unknown_fields() {
        let text = r#"[1,"x",1,1,{"4":{"rec":{"1":{"set":["dbl",2,1.5,"-Infinity"]}}}}]"#;
        let mut input = JsonInputProtocol::new(text.as_bytes()).unwrap();
        input.read_message_begin().unwrap();
        input.skip(FieldType::Struct).unwrap();
        input.read_message_end().unwrap();
    }

    #[test]
    fn binary_is_base64() {
        let text = encode(|out| out.write_bytes(b"\x00\xffok").unwrap());
        assert_eq!(text, r#""AP9vaw==""#);

        let mut input = JsonInputProtocol::new(b"[1,\"b\",1,1,{}]").unwrap();
        input.read_message_begin().unwrap();
        input.frames.push(Frame::Values(VecDeque::from([Value::String(
            "AP9vaw==".to_string(),
        )])));
        assert_eq!(input.read_bytes().unwrap(), b"\x00\xffok".to_vec());
    }

    #[test]
    fn message_len_finds_value_boundary() {
        let first = br#"[1,"a",1,1,{}]"#;
        let mut buf = first.to_vec();
        buf.extend_from_slice(br#"[1,"b""#);
        assert_eq!(json_message_len(&buf).unwrap(), Some(first.len()));
        assert_eq!(json_message_len(&buf[..5]).unwrap(), None);
        assert_eq!(json_message_len(b"  ").unwrap(), None);
        assert!(json_message_len(b"]").is_err());
    }
}
