//! Typed cell values and their text/binary wire encodings.
use crate::error::ProtocolError;

use super::{
    codec::{PacketReader, PacketWriter},
    consts::{NULL_MARKER, field_type::*},
};

/// Flag byte paired with a parameter type to mark it unsigned.
pub const PARAM_UNSIGNED: u8 = 0x80;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Signed(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            Value::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            Value::Signed(v) => u64::try_from(*v).ok(),
            Value::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Signed(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Textual rendering used by the text row format; `None` for NULL.
    pub fn to_text(&self) -> Option<Vec<u8>> {
        match self {
            Value::Null => None,
            Value::Signed(v) => Some(v.to_string().into_bytes()),
            Value::Unsigned(v) => Some(v.to_string().into_bytes()),
            Value::Float(v) => Some(v.to_string().into_bytes()),
            Value::Bytes(b) => Some(b.clone()),
        }
    }

    /// Column type and unsigned flag this value is sent with in the binary protocol.
    pub fn binary_type(&self) -> (u8, bool) {
        match self {
            Value::Null => (MYSQL_TYPE_NULL, false),
            Value::Signed(_) => (MYSQL_TYPE_LONGLONG, false),
            Value::Unsigned(_) => (MYSQL_TYPE_LONGLONG, true),
            Value::Float(_) => (MYSQL_TYPE_DOUBLE, false),
            Value::Bytes(_) => (MYSQL_TYPE_VAR_STRING, false),
        }
    }

    /// Appends the binary encoding for [`Value::binary_type`]. NULL writes nothing.
    pub fn write_binary(&self, writer: &mut PacketWriter) {
        match self {
            Value::Null => {}
            Value::Signed(v) => writer.write_u64(*v as u64),
            Value::Unsigned(v) => writer.write_u64(*v),
            Value::Float(v) => writer.write_u64(v.to_bits()),
            Value::Bytes(b) => writer.write_lenenc_bytes(b),
        }
    }

    pub fn write_text(&self, writer: &mut PacketWriter) {
        match self.to_text() {
            Some(text) => writer.write_lenenc_bytes(&text),
            None => writer.write_u8(NULL_MARKER),
        }
    }

    /// Reads one text-protocol cell of the given column type.
    pub fn read_text(
        reader: &mut PacketReader<'_>,
        field_type: u8,
        unsigned: bool,
    ) -> Result<Value, ProtocolError> {
        let Some(data) = reader.read_lenenc_bytes_nullable()? else {
            return Ok(Value::Null);
        };

        let parse_err = |_| ProtocolError::MalformedPacket;
        let value = match field_type {
            MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG
            | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
                let text = std::str::from_utf8(data).map_err(|_| ProtocolError::MalformedPacket)?;
                if unsigned {
                    Value::Unsigned(text.parse().map_err(parse_err)?)
                } else {
                    Value::Signed(text.parse().map_err(parse_err)?)
                }
            }
            MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => {
                let text = std::str::from_utf8(data).map_err(|_| ProtocolError::MalformedPacket)?;
                Value::Float(text.parse().map_err(|_| ProtocolError::MalformedPacket)?)
            }
            _ => Value::Bytes(data.to_vec()),
        };
        Ok(value)
    }

    /// Reads one binary-protocol value (row cell or bound parameter).
    pub fn read_binary(
        reader: &mut PacketReader<'_>,
        field_type: u8,
        unsigned: bool,
    ) -> Result<Value, ProtocolError> {
        let value = match field_type {
            MYSQL_TYPE_NULL => Value::Null,
            MYSQL_TYPE_TINY => {
                let v = reader.read_u8()?;
                if unsigned {
                    Value::Unsigned(v.into())
                } else {
                    Value::Signed((v as i8).into())
                }
            }
            MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => {
                let v = reader.read_u16()?;
                if unsigned {
                    Value::Unsigned(v.into())
                } else {
                    Value::Signed((v as i16).into())
                }
            }
            MYSQL_TYPE_INT24 | MYSQL_TYPE_LONG => {
                let v = reader.read_u32()?;
                if unsigned {
                    Value::Unsigned(v.into())
                } else {
                    Value::Signed((v as i32).into())
                }
            }
            MYSQL_TYPE_LONGLONG => {
                let v = reader.read_u64()?;
                if unsigned {
                    Value::Unsigned(v)
                } else {
                    Value::Signed(v as i64)
                }
            }
            MYSQL_TYPE_FLOAT => Value::Float(f32::from_bits(reader.read_u32()?).into()),
            MYSQL_TYPE_DOUBLE => Value::Float(f64::from_bits(reader.read_u64()?)),
            MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE | MYSQL_TYPE_DATETIME | MYSQL_TYPE_TIMESTAMP => {
                let data = reader.read_lenenc_bytes()?;
                Value::Bytes(format_datetime(field_type, data)?.into_bytes())
            }
            MYSQL_TYPE_TIME => {
                let data = reader.read_lenenc_bytes()?;
                Value::Bytes(format_time(data)?.into_bytes())
            }
            MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL | MYSQL_TYPE_VARCHAR | MYSQL_TYPE_BIT
            | MYSQL_TYPE_JSON | MYSQL_TYPE_ENUM | MYSQL_TYPE_SET | MYSQL_TYPE_TINY_BLOB
            | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_LONG_BLOB | MYSQL_TYPE_BLOB
            | MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_STRING | MYSQL_TYPE_GEOMETRY => {
                Value::Bytes(reader.read_lenenc_bytes()?.to_vec())
            }
            other => {
                return Err(ProtocolError::Unsupported(format!(
                    "binary value of column type {other:#04x}"
                )));
            }
        };
        Ok(value)
    }
}

fn format_datetime(field_type: u8, data: &[u8]) -> Result<String, ProtocolError> {
    let mut reader = PacketReader::new(data);
    let date_only = matches!(field_type, MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE);

    let out = match data.len() {
        0 if date_only => "0000-00-00".to_string(),
        0 => "0000-00-00 00:00:00".to_string(),
        4 | 7 | 11 => {
            let year = reader.read_u16()?;
            let month = reader.read_u8()?;
            let day = reader.read_u8()?;
            if date_only {
                format!("{year:04}-{month:02}-{day:02}")
            } else {
                let (hour, minute, second) = if data.len() >= 7 {
                    (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?)
                } else {
                    (0, 0, 0)
                };
                let mut out =
                    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
                if data.len() == 11 {
                    out.push_str(&format!(".{:06}", reader.read_u32()?));
                }
                out
            }
        }
        _ => return Err(ProtocolError::MalformedPacket),
    };
    Ok(out)
}

fn format_time(data: &[u8]) -> Result<String, ProtocolError> {
    let mut reader = PacketReader::new(data);

    let out = match data.len() {
        0 => "00:00:00".to_string(),
        8 | 12 => {
            let sign = if reader.read_u8()? == 1 { "-" } else { "" };
            let days = u64::from(reader.read_u32()?);
            let hours = days * 24 + u64::from(reader.read_u8()?);
            let minute = reader.read_u8()?;
            let second = reader.read_u8()?;
            let mut out = format!("{sign}{hours:02}:{minute:02}:{second:02}");
            if data.len() == 12 {
                out.push_str(&format!(".{:06}", reader.read_u32()?));
            }
            out
        }
        _ => return Err(ProtocolError::MalformedPacket),
    };
    Ok(out)
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Signed(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Signed(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Unsigned(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Unsigned(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
