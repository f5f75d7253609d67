//! Compact protocol.
//!
//! Zigzag varints for integers, field ids encoded as deltas from the previous
//! field, booleans folded into the field header, little-endian doubles.

use super::binary::ByteCursor;
use super::scan::{CursorProtocol, MessageScanner, SkipScanner};
use super::{
    checked_size, FieldIdentifier, FieldType, InputProtocol, ListIdentifier,
    MapIdentifier, MessageIdentifier, MessageType, OutputProtocol, ProtocolError, ProtocolFactory,
    ProtocolKind, Result, SetIdentifier, StructIdentifier,
};

const PROTOCOL_ID: u8 = 0x82;
const VERSION: u8 = 1;
const VERSION_MASK: u8 = 0x1f;
const TYPE_SHIFT: u8 = 5;
const TYPE_BITS: u8 = 0x07;

const COMPACT_BOOLEAN_TRUE: u8 = 0x01;
const COMPACT_BOOLEAN_FALSE: u8 = 0x02;

fn compact_type(field_type: FieldType) -> Result<u8> {
    match field_type {
        FieldType::Stop => Ok(0x00),
        FieldType::Bool => Ok(COMPACT_BOOLEAN_TRUE),
        FieldType::I8 => Ok(0x03),
        FieldType::I16 => Ok(0x04),
        FieldType::I32 => Ok(0x05),
        FieldType::I64 => Ok(0x06),
        FieldType::Double => Ok(0x07),
        FieldType::String => Ok(0x08),
        FieldType::List => Ok(0x09),
        FieldType::Set => Ok(0x0a),
        FieldType::Map => Ok(0x0b),
        FieldType::Struct => Ok(0x0c),
        FieldType::Void => Err(ProtocolError::InvalidData(
            "void has no compact encoding".to_string(),
        )),
    }
}

fn field_type(compact: u8) -> Result<FieldType> {
    match compact {
        0x00 => Ok(FieldType::Stop),
        COMPACT_BOOLEAN_TRUE | COMPACT_BOOLEAN_FALSE => Ok(FieldType::Bool),
        0x03 => Ok(FieldType::I8),
        0x04 => Ok(FieldType::I16),
        0x05 => Ok(FieldType::I32),
        0x06 => Ok(FieldType::I64),
        0x07 => Ok(FieldType::Double),
        0x08 => Ok(FieldType::String),
        0x09 => Ok(FieldType::List),
        0x0a => Ok(FieldType::Set),
        0x0b => Ok(FieldType::Map),
        0x0c => Ok(FieldType::Struct),
        other => Err(ProtocolError::InvalidData(format!(
            "unknown compact type {:#x}",
            other
        ))),
    }
}

fn zigzag_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

fn zigzag_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

fn unzigzag_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Decoder for the compact protocol.
#[derive(Debug)]
pub struct CompactInputProtocol<'a> {
    cursor: ByteCursor<'a>,
    last_field_id: i16,
    field_stack: Vec<i16>,
    pending_bool: Option<bool>,
}

impl<'a> CompactInputProtocol<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(buf),
            last_field_id: 0,
            field_stack: Vec::new(),
            pending_bool: None,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = self.cursor.byte()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(ProtocolError::InvalidData("varint too long".to_string()))
    }

    fn read_varint_u32(&mut self) -> Result<u32> {
        u32::try_from(self.read_varint()?)
            .map_err(|_| ProtocolError::InvalidData("varint overflows 32 bits".to_string()))
    }

    fn read_collection_header(&mut self) -> Result<(FieldType, i32)> {
        let header = self.cursor.byte()?;
        let element_type = field_type(header & 0x0f)?;
        let short_size = (header >> 4) & 0x0f;
        let size = if short_size == 0x0f {
            let size = self.read_varint_u32()? as i32;
            checked_size(size as i64)?;
            size
        } else {
            short_size as i32
        };
        Ok((element_type, size))
    }
}

impl InputProtocol for CompactInputProtocol<'_> {
    fn read_message_begin(&mut self) -> Result<MessageIdentifier> {
        let protocol_id = self.cursor.byte()?;
        if protocol_id != PROTOCOL_ID {
            return Err(ProtocolError::InvalidData(format!(
                "expected compact protocol id {:#x}, got {:#x}",
                PROTOCOL_ID, protocol_id
            )));
        }
        let version_and_type = self.cursor.byte()?;
        let version = version_and_type & VERSION_MASK;
        if version != VERSION {
            return Err(ProtocolError::BadVersion(u32::from(version)));
        }
        let message_type = MessageType::try_from((version_and_type >> TYPE_SHIFT) & TYPE_BITS)?;
        let sequence_number = self.read_varint_u32()? as i32;
        let name = self.read_string()?;
        Ok(MessageIdentifier::new(name, message_type, sequence_number))
    }

    fn read_message_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_struct_begin(&mut self) -> Result<()> {
        self.field_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<()> {
        self.last_field_id = self.field_stack.pop().ok_or_else(|| {
            ProtocolError::InvalidData("struct end without matching begin".to_string())
        })?;
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<FieldIdentifier> {
        let header = self.cursor.byte()?;
        let compact = header & 0x0f;
        if compact == 0 {
            return Ok(FieldIdentifier::stop());
        }

        let delta = (header >> 4) & 0x0f;
        let id = if delta == 0 {
            self.read_i16()?
        } else {
            self.last_field_id.wrapping_add(i16::from(delta))
        };
        let field_type = field_type(compact)?;
        if field_type == FieldType::Bool {
            self.pending_bool = Some(compact == COMPACT_BOOLEAN_TRUE);
        }
        self.last_field_id = id;

        Ok(FieldIdentifier {
            name: None,
            field_type,
            id: Some(id),
        })
    }

    fn read_field_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.pending_bool.take() {
            Some(b) => Ok(b),
            None => Ok(self.cursor.byte()? == COMPACT_BOOLEAN_TRUE),
        }
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint_u32()? as usize;
        Ok(self.cursor.take(len)?.to_vec())
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.cursor.byte()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16> {
        let value = unzigzag_32(self.read_varint_u32()?);
        i16::try_from(value)
            .map_err(|_| ProtocolError::InvalidData(format!("{} overflows i16", value)))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(unzigzag_32(self.read_varint_u32()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(unzigzag_64(self.read_varint()?))
    }

    fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_le_bytes(self.cursor.array()?)))
    }

    fn read_string(&mut self) -> Result<String> {
        Ok(String::from_utf8(self.read_bytes()?)?)
    }

    fn read_list_begin(&mut self) -> Result<ListIdentifier> {
        let (element_type, size) = self.read_collection_header()?;
        Ok(ListIdentifier::new(element_type, size))
    }

    fn read_list_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<SetIdentifier> {
        let (element_type, size) = self.read_collection_header()?;
        Ok(SetIdentifier::new(element_type, size))
    }

    fn read_set_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<MapIdentifier> {
        let size = self.read_varint_u32()? as i32;
        checked_size(size as i64)?;
        if size == 0 {
            return Ok(MapIdentifier {
                key_type: None,
                value_type: None,
                size: 0,
            });
        }
        let types = self.cursor.byte()?;
        let key_type = field_type((types >> 4) & 0x0f)?;
        let value_type = field_type(types & 0x0f)?;
        Ok(MapIdentifier::new(key_type, value_type, size))
    }

    fn read_map_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Encoder for the compact protocol.
#[derive(Debug)]
pub struct CompactOutputProtocol<'a> {
    buf: &'a mut Vec<u8>,
    last_field_id: i16,
    field_stack: Vec<i16>,
    pending_bool_field: Option<i16>,
}

impl<'a> CompactOutputProtocol<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self {
            buf,
            last_field_id: 0,
            field_stack: Vec::new(),
            pending_bool_field: None,
        }
    }

    fn write_varint(&mut self, mut n: u64) {
        while n >= 0x80 {
            self.buf.push((n as u8 & 0x7f) | 0x80);
            n >>= 7;
        }
        self.buf.push(n as u8);
    }

    fn write_field_header(&mut self, compact: u8, id: i16) {
        let delta = i32::from(id) - i32::from(self.last_field_id);
        if id > self.last_field_id && delta <= 15 {
            self.buf.push(((delta as u8) << 4) | compact);
        } else {
            self.buf.push(compact);
            self.write_varint(u64::from(zigzag_32(i32::from(id))));
        }
        self.last_field_id = id;
    }

    fn write_collection_header(&mut self, element_type: FieldType, size: i32) -> Result<()> {
        let size = checked_size(size as i64)?;
        let compact = compact_type(element_type)?;
        if size < 15 {
            self.buf.push(((size as u8) << 4) | compact);
        } else {
            self.buf.push(0xf0 | compact);
            self.write_varint(size as u64);
        }
        Ok(())
    }
}

impl OutputProtocol for CompactOutputProtocol<'_> {
    fn write_message_begin(&mut self, identifier: &MessageIdentifier) -> Result<()> {
        self.buf.push(PROTOCOL_ID);
        self.buf
            .push((VERSION & VERSION_MASK) | ((identifier.message_type as u8) << TYPE_SHIFT));
        self.write_varint(u64::from(identifier.sequence_number as u32));
        self.write_string(&identifier.name)
    }

    fn write_message_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_struct_begin(&mut self, _identifier: &StructIdentifier) -> Result<()> {
        self.field_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<()> {
        self.last_field_id = self.field_stack.pop().ok_or_else(|| {
            ProtocolError::InvalidData("struct end without matching begin".to_string())
        })?;
        Ok(())
    }

    fn write_field_begin(&mut self, identifier: &FieldIdentifier) -> Result<()> {
        let id = identifier.require_id()?;
        if identifier.field_type == FieldType::Bool {
            // The value is folded into the header once it is known.
            self.pending_bool_field = Some(id);
            return Ok(());
        }
        let compact = compact_type(identifier.field_type)?;
        self.write_field_header(compact, id);
        Ok(())
    }

    fn write_field_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<()> {
        self.buf.push(0);
        Ok(())
    }

    fn write_bool(&mut self, b: bool) -> Result<()> {
        let compact = if b {
            COMPACT_BOOLEAN_TRUE
        } else {
            COMPACT_BOOLEAN_FALSE
        };
        match self.pending_bool_field.take() {
            Some(id) => self.write_field_header(compact, id),
            None => self.buf.push(compact),
        }
        Ok(())
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.write_varint(b.len() as u64);
        self.buf.extend_from_slice(b);
        Ok(())
    }

    fn write_i8(&mut self, i: i8) -> Result<()> {
        self.buf.push(i as u8);
        Ok(())
    }

    fn write_i16(&mut self, i: i16) -> Result<()> {
        self.write_varint(u64::from(zigzag_32(i32::from(i))));
        Ok(())
    }

    fn write_i32(&mut self, i: i32) -> Result<()> {
        self.write_varint(u64::from(zigzag_32(i)));
        Ok(())
    }

    fn write_i64(&mut self, i: i64) -> Result<()> {
        self.write_varint(zigzag_64(i));
        Ok(())
    }

    fn write_double(&mut self, d: f64) -> Result<()> {
        self.buf.extend_from_slice(&d.to_bits().to_le_bytes());
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    fn write_list_begin(&mut self, identifier: &ListIdentifier) -> Result<()> {
        self.write_collection_header(identifier.element_type, identifier.size)
    }

    fn write_list_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_set_begin(&mut self, identifier: &SetIdentifier) -> Result<()> {
        self.write_collection_header(identifier.element_type, identifier.size)
    }

    fn write_set_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_map_begin(&mut self, identifier: &MapIdentifier) -> Result<()> {
        let size = checked_size(identifier.size as i64)?;
        if size == 0 {
            self.buf.push(0);
            return Ok(());
        }
        let key_type = identifier
            .key_type
            .ok_or_else(|| ProtocolError::InvalidData("map key type missing".to_string()))?;
        let value_type = identifier
            .value_type
            .ok_or_else(|| ProtocolError::InvalidData("map value type missing".to_string()))?;
        self.write_varint(size as u64);
        self.buf
            .push((compact_type(key_type)? << 4) | compact_type(value_type)?);
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CompactProtocolFactory;

impl ProtocolFactory for CompactProtocolFactory {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Compact
    }

    fn reader<'a>(&self, buf: &'a [u8]) -> Result<Box<dyn InputProtocol + 'a>> {
        Ok(Box::new(CompactInputProtocol::new(buf)))
    }

    fn writer<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn OutputProtocol + 'a> {
        Box::new(CompactOutputProtocol::new(buf))
    }

    fn scanner(&self) -> Box<dyn MessageScanner> {
        Box::new(SkipScanner::<Self>::new())
    }
}

impl CursorProtocol for CompactProtocolFactory {
    type Input<'a> = CompactInputProtocol<'a>;

    fn open(buf: &[u8]) -> CompactInputProtocol<'_> {
        CompactInputProtocol::new(buf)
    }

    fn position(input: &CompactInputProtocol<'_>) -> usize {
        input.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_matches_reference_values() {
        assert_eq!(zigzag_32(0), 0);
        assert_eq!(zigzag_32(-1), 1);
        assert_eq!(zigzag_32(1), 2);
        assert_eq!(zigzag_32(-2), 3);
        assert_eq!(zigzag_64(i64::MIN), u64::MAX);
        for n in [0, 1, -1, 300, -300, i32::MAX, i32::MIN] {
            assert_eq!(unzigzag_32(zigzag_32(n)), n);
        }
    }

    #[test]
    fn envelope_layout() {
        let mut buf = Vec::new();
        CompactOutputProtocol::new(&mut buf)
            .write_message_begin(&MessageIdentifier::new("ping", MessageType::Reply, 300))
            .unwrap();
        // protocol id, version|type, varint(300), varint(4), "ping"
        assert_eq!(buf, vec![0x82, 0x41, 0xac, 0x02, 0x04, b'p', b'i', b'n', b'g']);
    }

    #[test]
    fn field_ids_use_short_deltas_and_long_form() {
        let mut buf = Vec::new();
        let mut out = CompactOutputProtocol::new(&mut buf);
        out.write_struct_begin(&StructIdentifier::new("s")).unwrap();
        out.write_field_begin(&FieldIdentifier::new("a", FieldType::I32, 1))
            .unwrap();
        out.write_i32(5).unwrap();
        out.write_field_begin(&FieldIdentifier::new("b", FieldType::I8, 100))
            .unwrap();
        out.write_i8(-1).unwrap();
        out.write_field_stop().unwrap();
        out.write_struct_end().unwrap();

        assert_eq!(buf, vec![0x15, 0x0a, 0x03, 0xc8, 0x01, 0xff, 0x00]);

        let mut input = CompactInputProtocol::new(&buf);
        input.read_struct_begin().unwrap();
        let a = input.read_field_begin().unwrap();
        assert_eq!((a.field_type, a.id), (FieldType::I32, Some(1)));
        assert_eq!(input.read_i32().unwrap(), 5);
        let b = input.read_field_begin().unwrap();
        assert_eq!((b.field_type, b.id), (FieldType::I8, Some(100)));
        assert_eq!(input.read_i8().unwrap(), -1);
        assert_eq!(input.read_field_begin().unwrap().field_type, FieldType::Stop);
        input.read_struct_end().unwrap();
    }

    #[test]
    fn bool_fields_fold_into_header() {
        let mut buf = Vec::new();
        let mut out = CompactOutputProtocol::new(&mut buf);
        out.write_struct_begin(&StructIdentifier::new("flags")).unwrap();
        out.write_field_begin(&FieldIdentifier::new("on", FieldType::Bool, 1))
            .unwrap();
        out.write_bool(true).unwrap();
        out.write_field_begin(&FieldIdentifier::new("off", FieldType::Bool, 2))
            .unwrap();
        out.write_bool(false).unwrap();
        out.write_field_stop().unwrap();
        out.write_struct_end().unwrap();
        assert_eq!(buf, vec![0x11, 0x12, 0x00]);

        let mut input = CompactInputProtocol::new(&buf);
        input.read_struct_begin().unwrap();
        assert_eq!(input.read_field_begin().unwrap().field_type, FieldType::Bool);
        assert!(input.read_bool().unwrap());
        assert_eq!(input.read_field_begin().unwrap().field_type, FieldType::Bool);
        assert!(!input.read_bool().unwrap());
    }

    #[test]
    fn long_lists_use_varint_size() {
        let mut buf = Vec::new();
        CompactOutputProtocol::new(&mut buf)
            .write_list_begin(&ListIdentifier::new(FieldType::I64, 20))
            .unwrap();
        assert_eq!(buf, vec![0xf6, 20]);

        let ident = CompactInputProtocol::new(&buf).read_list_begin().unwrap();
        assert_eq!(ident, ListIdentifier::new(FieldType::I64, 20));
    }

    #[test]
    fn empty_map_is_a_single_byte() {
        let mut buf = Vec::new();
        CompactOutputProtocol::new(&mut buf)
            .write_map_begin(&MapIdentifier::new(FieldType::String, FieldType::I32, 0))
            .unwrap();
        assert_eq!(buf, vec![0]);
        let ident = CompactInputProtocol::new(&buf).read_map_begin().unwrap();
        assert_eq!(ident.size, 0);
        assert_eq!(ident.key_type, None);
    }
}
