use crate::error::{ConvertError, Result};
use crate::types::{FieldType, FieldValue};
use std::io::{ErrorKind, Read};

/// Magic bytes at the start of every ULog file ("ULog" + 0x01 0x12 0x35)
pub const ULOG_MAGIC: [u8; 7] = [0x55, 0x4c, 0x6f, 0x67, 0x01, 0x12, 0x35];
pub const FILE_HEADER_SIZE: usize = 16;
pub const MESSAGE_HEADER_SIZE: usize = 3;

/// Cursor over the payload of a single message
pub struct PayloadStream<'a> {
    data: &'a [u8],
    pub pos: usize,
}

impl<'a> PayloadStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ConvertError::MalformedLog(format!(
                "payload needs {} bytes at offset {} but only {} remain",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Everything left in the payload as (lossy) UTF-8 text
    pub fn read_rest_str(&mut self) -> String {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        decode_text(rest)
    }

    pub fn read_str(&mut self, len: usize) -> Result<String> {
        Ok(decode_text(self.read_bytes(len)?))
    }

    /// Read one element of a primitive field type
    pub fn read_primitive(&mut self, field_type: &FieldType) -> Result<FieldValue> {
        let size = field_type.primitive_size().ok_or_else(|| {
            ConvertError::MalformedLog(format!("{:?} is not a primitive type", field_type))
        })?;
        let b = self.read_bytes(size)?;
        let value = match field_type {
            FieldType::Int8 => FieldValue::Int(b[0] as i8 as i64),
            FieldType::UInt8 => FieldValue::UInt(b[0] as u64),
            FieldType::Bool => FieldValue::Bool(b[0] != 0),
            FieldType::Char => FieldValue::Text(decode_text(b)),
            FieldType::Int16 => FieldValue::Int(i16::from_le_bytes([b[0], b[1]]) as i64),
            FieldType::UInt16 => FieldValue::UInt(u16::from_le_bytes([b[0], b[1]]) as u64),
            FieldType::Int32 => FieldValue::Int(i32::from_le_bytes(le4(b)) as i64),
            FieldType::UInt32 => FieldValue::UInt(u32::from_le_bytes(le4(b)) as u64),
            FieldType::Float => FieldValue::Float(f32::from_le_bytes(le4(b)) as f64),
            FieldType::Int64 => FieldValue::Int(i64::from_le_bytes(le8(b))),
            FieldType::UInt64 => FieldValue::UInt(u64::from_le_bytes(le8(b))),
            FieldType::Double => FieldValue::Float(f64::from_le_bytes(le8(b))),
            FieldType::Nested(_) => unreachable!(),
        };
        Ok(value)
    }
}

fn le4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

fn le8(b: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[..8]);
    buf
}

/// Char arrays are NUL-padded
pub fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// A framed message as stored in the file
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub msg_type: u8,
    pub payload: Vec<u8>,
    /// File offset of the message header
    pub offset: u64,
}

/// Forward-only reader of framed ULog messages
pub struct MessageStream<R> {
    inner: R,
    pub pos: u64,
}

impl<R: Read> MessageStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Read and validate the 16-byte file header, returning (version, start timestamp)
    pub fn read_file_header(&mut self) -> Result<(u8, u64)> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        let got = self.fill(&mut buf)?;
        if got < FILE_HEADER_SIZE {
            return Err(ConvertError::MalformedLog(format!(
                "file is {} bytes, too short for a ULog header",
                got
            )));
        }
        if buf[..ULOG_MAGIC.len()] != ULOG_MAGIC {
            return Err(ConvertError::MalformedLog(
                "header magic does not match ULog signature".into(),
            ));
        }
        let version = buf[7];
        let timestamp = u64::from_le_bytes(le8(&buf[8..16]));
        Ok((version, timestamp))
    }

    /// Next message, or `None` at a clean end of stream
    pub fn next_message(&mut self) -> Result<Option<RawMessage>> {
        let offset = self.pos;
        let mut header = [0u8; MESSAGE_HEADER_SIZE];
        let got = self.fill(&mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < MESSAGE_HEADER_SIZE {
            return Err(ConvertError::MalformedLog(format!(
                "truncated message header at offset {}",
                offset
            )));
        }

        let size = u16::from_le_bytes([header[0], header[1]]) as usize;
        let msg_type = header[2];
        let mut payload = vec![0u8; size];
        let got = self.fill(&mut payload)?;
        if got < size {
            return Err(ConvertError::MalformedLog(format!(
                "message '{}' at offset {} declares {} bytes but only {} remain",
                msg_type as char, offset, size, got
            )));
        }

        Ok(Some(RawMessage {
            msg_type,
            payload,
            offset,
        }))
    }

    /// Read until `buf` is full or the stream ends; returns bytes read
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConvertError::Io(e)),
            }
        }
        self.pos += filled as u64;
        Ok(filled)
    }
}
