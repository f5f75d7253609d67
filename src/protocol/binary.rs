//! Strict binary protocol.
//!
//! Big-endian fixed-width integers, length-prefixed strings and a versioned
//! message envelope (`0x8001_0000 | message_type`). Readers also accept the
//! older non-strict envelope, which starts with the method name length.

use super::scan::{CursorProtocol, MessageScanner, SkipScanner};
use super::{
    checked_size, FieldIdentifier, FieldType, InputProtocol, ListIdentifier,
    MapIdentifier, MessageIdentifier, MessageType, OutputProtocol, ProtocolError, ProtocolFactory,
    ProtocolKind, Result, SetIdentifier, StructIdentifier,
};

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

/// Bounds-checked cursor over a message buffer.
#[derive(Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(ProtocolError::UnexpectedEof)?;
        if end > self.buf.len() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Decoder for the binary protocol.
#[derive(Debug)]
pub struct BinaryInputProtocol<'a> {
    cursor: ByteCursor<'a>,
}

impl<'a> BinaryInputProtocol<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(buf),
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    fn read_sized_bytes(&mut self, len: i32) -> Result<Vec<u8>> {
        let len = checked_size(len as i64)?;
        Ok(self.cursor.take(len)?.to_vec())
    }

    fn read_type(&mut self) -> Result<FieldType> {
        FieldType::try_from(self.cursor.byte()?)
    }
}

impl InputProtocol for BinaryInputProtocol<'_> {
    fn read_message_begin(&mut self) -> Result<MessageIdentifier> {
        let header = self.read_i32()?;
        if header < 0 {
            let version = header as u32 & VERSION_MASK;
            if version != VERSION_1 {
                return Err(ProtocolError::BadVersion(version));
            }
            let message_type = MessageType::try_from((header & 0xff) as u8)?;
            let name = self.read_string()?;
            let sequence_number = self.read_i32()?;
            Ok(MessageIdentifier::new(name, message_type, sequence_number))
        } else {
            // Non-strict envelope: the header is the name length.
            let name = String::from_utf8(self.read_sized_bytes(header)?)?;
            let message_type = MessageType::try_from(self.cursor.byte()?)?;
            let sequence_number = self.read_i32()?;
            Ok(MessageIdentifier::new(name, message_type, sequence_number))
        }
    }

    fn read_message_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_struct_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<FieldIdentifier> {
        let field_type = self.read_type()?;
        if field_type == FieldType::Stop {
            return Ok(FieldIdentifier::stop());
        }
        let id = self.read_i16()?;
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
        Ok(self.cursor.byte()? != 0)
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_i32()?;
        self.read_sized_bytes(len)
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.cursor.byte()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.cursor.array()?))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.cursor.array()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.cursor.array()?))
    }

    fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.cursor.array()?)))
    }

    fn read_string(&mut self) -> Result<String> {
        Ok(String::from_utf8(self.read_bytes()?)?)
    }

    fn read_list_begin(&mut self) -> Result<ListIdentifier> {
        let element_type = self.read_type()?;
        let size = self.read_i32()?;
        checked_size(size as i64)?;
        Ok(ListIdentifier::new(element_type, size))
    }

    fn read_list_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<SetIdentifier> {
        let element_type = self.read_type()?;
        let size = self.read_i32()?;
        checked_size(size as i64)?;
        Ok(SetIdentifier::new(element_type, size))
    }

    fn read_set_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<MapIdentifier> {
        let key_type = self.read_type()?;
        let value_type = self.read_type()?;
        let size = self.read_i32()?;
        checked_size(size as i64)?;
        Ok(MapIdentifier::new(key_type, value_type, size))
    }

    fn read_map_end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Encoder for the binary protocol.
#[derive(Debug)]
pub struct BinaryOutputProtocol<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> BinaryOutputProtocol<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    fn write_type(&mut self, field_type: FieldType) {
        self.buf.push(field_type as u8);
    }
}

impl OutputProtocol for BinaryOutputProtocol<'_> {
    fn write_message_begin(&mut self, identifier: &MessageIdentifier) -> Result<()> {
        let header = VERSION_1 | identifier.message_type as u32;
        self.write_i32(header as i32)?;
        self.write_string(&identifier.name)?;
        self.write_i32(identifier.sequence_number)
    }

    fn write_message_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_struct_begin(&mut self, _identifier: &StructIdentifier) -> Result<()> {
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_field_begin(&mut self, identifier: &FieldIdentifier) -> Result<()> {
        let id = identifier.require_id()?;
        self.write_type(identifier.field_type);
        self.write_i16(id)
    }

    fn write_field_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<()> {
        self.write_type(FieldType::Stop);
        Ok(())
    }

    fn write_bool(&mut self, b: bool) -> Result<()> {
        self.buf.push(u8::from(b));
        Ok(())
    }

    fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        let len = i32::try_from(b.len()).map_err(|_| ProtocolError::SizeLimit {
            size: b.len(),
            limit: i32::MAX as usize,
        })?;
        self.write_i32(len)?;
        self.buf.extend_from_slice(b);
        Ok(())
    }

    fn write_i8(&mut self, i: i8) -> Result<()> {
        self.buf.push(i as u8);
        Ok(())
    }

    fn write_i16(&mut self, i: i16) -> Result<()> {
        self.buf.extend_from_slice(&i.to_be_bytes());
        Ok(())
    }

    fn write_i32(&mut self, i: i32) -> Result<()> {
        self.buf.extend_from_slice(&i.to_be_bytes());
        Ok(())
    }

    fn write_i64(&mut self, i: i64) -> Result<()> {
        self.buf.extend_from_slice(&i.to_be_bytes());
        Ok(())
    }

    fn write_double(&mut self, d: f64) -> Result<()> {
        self.buf.extend_from_slice(&d.to_bits().to_be_bytes());
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_bytes(s.as_bytes())
    }

    fn write_list_begin(&mut self, identifier: &ListIdentifier) -> Result<()> {
        self.write_type(identifier.element_type);
        self.write_i32(identifier.size)
    }

    fn write_list_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_set_begin(&mut self, identifier: &SetIdentifier) -> Result<()> {
        self.write_type(identifier.element_type);
        self.write_i32(identifier.size)
    }

    fn write_set_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_map_begin(&mut self, identifier: &MapIdentifier) -> Result<()> {
        self.write_type(identifier.key_type.unwrap_or(FieldType::Stop));
        self.write_type(identifier.value_type.unwrap_or(FieldType::Stop));
        self.write_i32(identifier.size)
    }

    fn write_map_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryProtocolFactory;

impl ProtocolFactory for BinaryProtocolFactory {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Binary
    }

    fn reader<'a>(&self, buf: &'a [u8]) -> Result<Box<dyn InputProtocol + 'a>> {
        Ok(Box::new(BinaryInputProtocol::new(buf)))
    }

    fn writer<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn OutputProtocol + 'a> {
        Box::new(BinaryOutputProtocol::new(buf))
    }

    fn scanner(&self) -> Box<dyn MessageScanner> {
        Box::new(SkipScanner::<Self>::new())
    }
}

impl CursorProtocol for BinaryProtocolFactory {
    type Input<'a> = BinaryInputProtocol<'a>;

    fn open(buf: &[u8]) -> BinaryInputProtocol<'_> {
        BinaryInputProtocol::new(buf)
    }

    fn position(input: &BinaryInputProtocol<'_>) -> usize {
        input.position()
    }
}
