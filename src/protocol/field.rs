use crate::error::ProtocolError;

use super::{
    codec::{PacketReader, PacketWriter},
    consts::{field_flag::UNSIGNED_FLAG, field_type::MYSQL_TYPE_VAR_STRING},
};

const CATALOG: &[u8] = b"def";
const FIXED_FIELDS_LEN: u64 = 0x0c;

/// Column definition (protocol 4.1 layout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub field_type: u8,
    pub flags: u16,
    pub decimals: u8,
    /// Only carried in COM_FIELD_LIST responses.
    pub default_value: Option<Vec<u8>>,
}

impl Default for Field {
    fn default() -> Self {
        Self {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: String::new(),
            org_name: String::new(),
            charset: super::consts::DEFAULT_COLLATION_ID.into(),
            column_length: 0,
            field_type: MYSQL_TYPE_VAR_STRING,
            flags: 0,
            decimals: 0,
            default_value: None,
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: u8) -> Self {
        let name = name.into();
        Self {
            org_name: name.clone(),
            name,
            field_type,
            ..Self::default()
        }
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & UNSIGNED_FLAG != 0
    }

    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = PacketReader::new(data);

        // catalog is always "def"
        reader.read_lenenc_bytes()?;
        let schema = reader.read_lenenc_string()?;
        let table = reader.read_lenenc_string()?;
        let org_table = reader.read_lenenc_string()?;
        let name = reader.read_lenenc_string()?;
        let org_name = reader.read_lenenc_string()?;

        let fixed = reader.read_lenenc_int()?;
        if fixed < FIXED_FIELDS_LEN {
            return Err(ProtocolError::MalformedPacket);
        }
        let charset = reader.read_u16()?;
        let column_length = reader.read_u32()?;
        let field_type = reader.read_u8()?;
        let flags = reader.read_u16()?;
        let decimals = reader.read_u8()?;
        reader.skip(2)?;

        let default_value = if reader.is_empty() {
            None
        } else {
            reader.read_lenenc_bytes_nullable()?.map(<[u8]>::to_vec)
        };

        Ok(Self {
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            column_length,
            field_type,
            flags,
            decimals,
            default_value,
        })
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut writer = PacketWriter::with_capacity(64);

        writer.write_lenenc_bytes(CATALOG);
        writer.write_lenenc_bytes(self.schema.as_bytes());
        writer.write_lenenc_bytes(self.table.as_bytes());
        writer.write_lenenc_bytes(self.org_table.as_bytes());
        writer.write_lenenc_bytes(self.name.as_bytes());
        writer.write_lenenc_bytes(self.org_name.as_bytes());
        writer.write_lenenc_int(FIXED_FIELDS_LEN);
        writer.write_u16(self.charset);
        writer.write_u32(self.column_length);
        writer.write_u8(self.field_type);
        writer.write_u16(self.flags);
        writer.write_u8(self.decimals);
        writer.write_zeros(2);

        if let Some(default) = &self.default_value {
            writer.write_lenenc_bytes(default);
        }

        writer.into_bytes()
    }
}
