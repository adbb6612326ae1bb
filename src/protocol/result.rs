use std::collections::HashMap;

use crate::error::ProtocolError;

use super::{
    codec::{PacketReader, PacketWriter},
    consts::{
        OK_HEADER,
        field_flag::{BINARY_FLAG, UNSIGNED_FLAG},
        field_type::{MYSQL_TYPE_DOUBLE, MYSQL_TYPE_LONGLONG, MYSQL_TYPE_NULL, MYSQL_TYPE_VAR_STRING},
    },
    field::Field,
    value::Value,
};

/// Outcome of a command: either an OK summary or a resultset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub affected_rows: u64,
    pub insert_id: u64,
    pub status: u16,
    pub resultset: Option<Resultset>,
}

impl QueryResult {
    pub fn ok(affected_rows: u64, insert_id: u64) -> Self {
        Self {
            affected_rows,
            insert_id,
            ..Self::default()
        }
    }

    pub fn with_resultset(resultset: Resultset) -> Self {
        Self {
            resultset: Some(resultset),
            ..Self::default()
        }
    }
}

/// Raw bytes of one row packet.
pub type RowData = Vec<u8>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resultset {
    pub fields: Vec<Field>,
    pub field_names: HashMap<String, usize>,
    pub row_data: Vec<RowData>,
    binary: bool,
    values: Option<Vec<Vec<Value>>>,
}

impl Resultset {
    /// An empty resultset whose rows use the binary encoding when `binary` is set.
    pub fn new(binary: bool) -> Self {
        Self {
            binary,
            ..Self::default()
        }
    }

    /// Adds a column definition; a later column with the same name wins lookups.
    pub fn push_field(&mut self, field: Field) {
        self.field_names.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn column_number(&self) -> usize {
        self.fields.len()
    }

    pub fn row_number(&self) -> usize {
        self.row_data.len()
    }

    pub fn name_index(&self, name: &str) -> Option<usize> {
        self.field_names.get(name).copied()
    }

    /// Parses every row into typed values on first use.
    pub fn values(&mut self) -> Result<&[Vec<Value>], ProtocolError> {
        if self.values.is_none() {
            let rows = self
                .row_data
                .iter()
                .map(|row| parse_row(&self.fields, row, self.binary))
                .collect::<Result<Vec<_>, _>>()?;
            self.values = Some(rows);
        }
        Ok(self.values.as_deref().unwrap_or_default())
    }

    pub fn value(&mut self, row: usize, column: usize) -> Result<Option<&Value>, ProtocolError> {
        Ok(self.values()?.get(row).and_then(|r| r.get(column)))
    }

    pub fn value_by_name(
        &mut self,
        row: usize,
        name: &str,
    ) -> Result<Option<&Value>, ProtocolError> {
        match self.name_index(name) {
            Some(column) => self.value(row, column),
            None => Ok(None),
        }
    }

    /// Builds a text-encoded resultset, inferring column types from the first
    /// non-NULL value of each column.
    pub fn from_text_rows(names: &[&str], rows: &[Vec<Value>]) -> Result<Self, ProtocolError> {
        Self::build(names, rows, false)
    }

    /// Builds a binary-encoded resultset, as returned by a prepared statement.
    pub fn from_binary_rows(names: &[&str], rows: &[Vec<Value>]) -> Result<Self, ProtocolError> {
        Self::build(names, rows, true)
    }

    fn build(names: &[&str], rows: &[Vec<Value>], binary: bool) -> Result<Self, ProtocolError> {
        let mut resultset = Self::new(binary);

        for (column, name) in names.iter().enumerate() {
            let sample = rows.iter().map(|r| r.get(column)).find_map(|v| match v {
                Some(Value::Null) | None => None,
                Some(v) => Some(v),
            });
            resultset.push_field(infer_field(name, sample));
        }

        for row in rows {
            if row.len() != names.len() {
                return Err(ProtocolError::MalformedPacket);
            }
            let data = if binary {
                dump_binary_row(row)
            } else {
                dump_text_row(row)
            };
            resultset.row_data.push(data);
        }

        Ok(resultset)
    }
}

fn infer_field(name: &str, sample: Option<&Value>) -> Field {
    let mut field = match sample {
        None => Field::new(name, MYSQL_TYPE_NULL),
        Some(Value::Signed(_)) => Field::new(name, MYSQL_TYPE_LONGLONG),
        Some(Value::Unsigned(_)) => Field {
            flags: UNSIGNED_FLAG,
            ..Field::new(name, MYSQL_TYPE_LONGLONG)
        },
        Some(Value::Float(_)) => Field::new(name, MYSQL_TYPE_DOUBLE),
        Some(Value::Bytes(_)) | Some(Value::Null) => Field::new(name, MYSQL_TYPE_VAR_STRING),
    };
    if field.field_type != MYSQL_TYPE_VAR_STRING {
        field.charset = super::consts::BINARY_COLLATION_ID;
        field.flags |= BINARY_FLAG;
    }
    field
}

fn dump_text_row(row: &[Value]) -> RowData {
    let mut writer = PacketWriter::new();
    for value in row {
        value.write_text(&mut writer);
    }
    writer.into_bytes()
}

fn null_bitmap_len(columns: usize) -> usize {
    (columns + 7 + 2) / 8
}

fn dump_binary_row(row: &[Value]) -> RowData {
    let mut writer = PacketWriter::new();
    writer.write_u8(OK_HEADER);

    let mut bitmap = vec![0u8; null_bitmap_len(row.len())];
    for (i, value) in row.iter().enumerate() {
        if value.is_null() {
            let bit = i + 2;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    writer.write_bytes(&bitmap);

    for value in row {
        value.write_binary(&mut writer);
    }
    writer.into_bytes()
}

/// Parses one raw row packet against its column definitions.
pub fn parse_row(fields: &[Field], data: &[u8], binary: bool) -> Result<Vec<Value>, ProtocolError> {
    let mut reader = PacketReader::new(data);
    let mut values = Vec::with_capacity(fields.len());

    if binary {
        if reader.read_u8()? != OK_HEADER {
            return Err(ProtocolError::MalformedPacket);
        }
        let bitmap = reader.read_bytes(null_bitmap_len(fields.len()))?;

        for (i, field) in fields.iter().enumerate() {
            let bit = i + 2;
            if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
                values.push(Value::Null);
                continue;
            }
            values.push(Value::read_binary(
                &mut reader,
                field.field_type,
                field.is_unsigned(),
            )?);
        }
    } else {
        for field in fields {
            values.push(Value::read_text(
                &mut reader,
                field.field_type,
                field.is_unsigned(),
            )?);
        }
    }

    if !reader.is_empty() {
        return Err(ProtocolError::MalformedPacket);
    }
    Ok(values)
}
