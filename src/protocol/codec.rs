//! Primitive field codecs used inside packet payloads.
//!
//! All integers are little-endian. Length-encoded integers use the MySQL
//! variable width scheme:
//!
//! - `0x00..=0xFA`: the value itself
//! - `0xFC` + 2 bytes, `0xFD` + 3 bytes, `0xFE` + 8 bytes
//! - `0xFB`: NULL (only meaningful for length-encoded strings)
use crate::error::ProtocolError;

/// Cursor over a reassembled payload.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::MalformedPacket);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        rest
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32, ProtocolError> {
        let b = self.read_bytes(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        let b = self.read_bytes(8)?;
        let mut buf = [0; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a length-encoded integer, returning `None` for the NULL marker.
    pub fn read_lenenc_int_nullable(&mut self) -> Result<Option<u64>, ProtocolError> {
        let first = self.read_u8()?;
        let value = match first {
            0x00..=0xFA => u64::from(first),
            0xFB => return Ok(None),
            0xFC => u64::from(self.read_u16()?),
            0xFD => u64::from(self.read_u24()?),
            0xFE => self.read_u64()?,
            0xFF => return Err(ProtocolError::MalformedPacket),
        };
        Ok(Some(value))
    }

    pub fn read_lenenc_int(&mut self) -> Result<u64, ProtocolError> {
        self.read_lenenc_int_nullable()?
            .ok_or(ProtocolError::MalformedPacket)
    }

    pub fn read_lenenc_bytes_nullable(&mut self) -> Result<Option<&'a [u8]>, ProtocolError> {
        match self.read_lenenc_int_nullable()? {
            Some(len) => {
                let len = usize::try_from(len).map_err(|_| ProtocolError::MalformedPacket)?;
                self.read_bytes(len).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn read_lenenc_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        self.read_lenenc_bytes_nullable()?
            .ok_or(ProtocolError::MalformedPacket)
    }

    pub fn read_lenenc_string(&mut self) -> Result<String, ProtocolError> {
        Ok(String::from_utf8_lossy(self.read_lenenc_bytes()?).into_owned())
    }

    /// Reads up to the next NUL byte and consumes the terminator when present.
    pub fn read_null_terminated(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        match rest.iter().position(|b| *b == 0) {
            Some(end) => {
                self.pos += end + 1;
                &rest[..end]
            }
            None => {
                self.pos = self.data.len();
                rest
            }
        }
    }
}

/// Growable payload buffer.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u24(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 1 << 16 {
            self.write_u8(0xFC);
            self.write_u16(value as u16);
        } else if value < 1 << 24 {
            self.write_u8(0xFD);
            self.write_u24(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64(value);
        }
    }

    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    pub fn write_null_terminated(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.buf.push(0);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }
}
