//! Response decoding and its inverse.
//!
//! A response payload is classified by its first byte: OK (`0x00`), ERR
//! (`0xFF`), EOF (`0xFE`, at most 5 bytes), LOCAL INFILE (`0xFB`, rejected) or
//! the column count that opens a resultset. The `parse_*`/`dump_*` pairs work
//! on single payloads; [`ResultDecoder`] drives multi-packet responses over a
//! [`PacketTransport`].
use std::io::{Read, Write};

use log::debug;

use crate::error::{Error, ProtocolError};

use super::{
    MyError, PacketTransport,
    codec::{PacketReader, PacketWriter},
    consts::{
        EOF_HEADER, ERR_HEADER, LOCAL_INFILE_HEADER, OK_HEADER,
        capability::{CLIENT_PROTOCOL_41, CLIENT_TRANSACTIONS},
    },
    field::Field,
    result::{QueryResult, Resultset},
};

const EOF_MAX_LEN: usize = 5;

pub fn is_eof_packet(data: &[u8]) -> bool {
    data.first() == Some(&EOF_HEADER) && data.len() <= EOF_MAX_LEN
}

pub fn is_err_packet(data: &[u8]) -> bool {
    data.first() == Some(&ERR_HEADER)
}

/// Decodes an OK packet; status is read only when the capabilities carry it.
pub fn parse_ok_packet(data: &[u8], capability: u32) -> Result<QueryResult, ProtocolError> {
    let mut reader = PacketReader::new(data);
    if reader.read_u8()? != OK_HEADER {
        return Err(ProtocolError::MalformedPacket);
    }

    let mut result = QueryResult {
        affected_rows: reader.read_lenenc_int()?,
        insert_id: reader.read_lenenc_int()?,
        ..QueryResult::default()
    };

    if capability & (CLIENT_PROTOCOL_41 | CLIENT_TRANSACTIONS) != 0 {
        result.status = reader.read_u16()?;
    }
    // warnings and the human readable info string are ignored

    Ok(result)
}

pub fn dump_ok_packet(result: &QueryResult, capability: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(32);
    writer.write_u8(OK_HEADER);
    writer.write_lenenc_int(result.affected_rows);
    writer.write_lenenc_int(result.insert_id);

    if capability & CLIENT_PROTOCOL_41 != 0 {
        writer.write_u16(result.status);
        writer.write_u16(0);
    } else if capability & CLIENT_TRANSACTIONS != 0 {
        writer.write_u16(result.status);
    }
    writer.into_bytes()
}

pub fn parse_err_packet(data: &[u8], capability: u32) -> Result<MyError, ProtocolError> {
    let mut reader = PacketReader::new(data);
    if reader.read_u8()? != ERR_HEADER {
        return Err(ProtocolError::MalformedPacket);
    }
    let code = reader.read_u16()?;

    let mut state = None;
    if capability & CLIENT_PROTOCOL_41 != 0 && reader.peek() == Some(b'#') {
        reader.skip(1)?;
        let mut buf = [0; 5];
        buf.copy_from_slice(reader.read_bytes(5)?);
        state = Some(buf);
    }

    let message = String::from_utf8_lossy(reader.read_rest()).into_owned();
    Ok(MyError {
        code,
        state,
        message,
    })
}

pub fn dump_err_packet(err: &MyError, capability: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(16 + err.message.len());
    writer.write_u8(ERR_HEADER);
    writer.write_u16(err.code);

    if capability & CLIENT_PROTOCOL_41 != 0 {
        writer.write_u8(b'#');
        writer.write_bytes(&err.state.unwrap_or(*b"HY000"));
    }
    writer.write_bytes(err.message.as_bytes());
    writer.into_bytes()
}

/// Status flags carried by a 4.1 EOF packet.
pub fn parse_eof_status(data: &[u8], capability: u32) -> Option<u16> {
    if capability & CLIENT_PROTOCOL_41 == 0 || data.len() < EOF_MAX_LEN {
        return None;
    }
    Some(u16::from_le_bytes([data[3], data[4]]))
}

pub fn dump_eof_packet(status: u16, capability: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(EOF_MAX_LEN);
    writer.write_u8(EOF_HEADER);
    if capability & CLIENT_PROTOCOL_41 != 0 {
        writer.write_u16(0);
        writer.write_u16(status);
    }
    writer.into_bytes()
}

/// Reads responses for one side of a connection, tracking negotiated
/// capabilities and the most recent server status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultDecoder {
    pub capability: u32,
    pub status: u16,
}

impl ResultDecoder {
    pub fn new(capability: u32) -> Self {
        Self {
            capability,
            status: 0,
        }
    }

    pub fn handle_ok_packet(&mut self, data: &[u8]) -> Result<QueryResult, Error> {
        let result = parse_ok_packet(data, self.capability)?;
        if self.capability & (CLIENT_PROTOCOL_41 | CLIENT_TRANSACTIONS) != 0 {
            self.status = result.status;
        }
        Ok(result)
    }

    pub fn handle_err_packet(&self, data: &[u8]) -> Error {
        match parse_err_packet(data, self.capability) {
            Ok(err) => Error::Server(err),
            Err(e) => e.into(),
        }
    }

    fn handle_eof_packet(&mut self, data: &[u8]) -> Option<u16> {
        let status = parse_eof_status(data, self.capability);
        if let Some(status) = status {
            self.status = status;
        }
        status
    }

    /// Expects a bare OK (or ERR) response.
    pub fn read_ok<T: Read + Write>(
        &mut self,
        transport: &mut PacketTransport<T>,
    ) -> Result<QueryResult, Error> {
        let data = transport.read_packet()?;
        match data.first() {
            Some(&OK_HEADER) => self.handle_ok_packet(&data),
            Some(&ERR_HEADER) => Err(self.handle_err_packet(&data)),
            _ => Err(ProtocolError::MalformedPacket.into()),
        }
    }

    /// Reads a complete command response, which may be a resultset.
    pub fn read_result<T: Read + Write>(
        &mut self,
        transport: &mut PacketTransport<T>,
        binary: bool,
    ) -> Result<QueryResult, Error> {
        let data = transport.read_packet()?;
        match data.first() {
            Some(&OK_HEADER) => self.handle_ok_packet(&data),
            Some(&ERR_HEADER) => Err(self.handle_err_packet(&data)),
            Some(&LOCAL_INFILE_HEADER) => {
                Err(ProtocolError::Unsupported("LOCAL INFILE request".to_string()).into())
            }
            Some(_) => self.read_resultset(transport, &data, binary),
            None => Err(ProtocolError::MalformedPacket.into()),
        }
    }

    fn read_resultset<T: Read + Write>(
        &mut self,
        transport: &mut PacketTransport<T>,
        data: &[u8],
        binary: bool,
    ) -> Result<QueryResult, Error> {
        let mut reader = PacketReader::new(data);
        let count = reader.read_lenenc_int()?;
        if !reader.is_empty() || count == 0 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        debug!("reading resultset with {count} columns");

        let mut resultset = Resultset::new(binary);
        for _ in 0..count {
            let data = transport.read_packet()?;
            if is_eof_packet(&data) {
                return Err(ProtocolError::MalformedPacket.into());
            }
            resultset.push_field(Field::parse(&data)?);
        }

        let data = transport.read_packet()?;
        if !is_eof_packet(&data) {
            return Err(ProtocolError::MalformedPacket.into());
        }
        let mut status = self.handle_eof_packet(&data);

        loop {
            let data = transport.read_packet()?;
            if is_eof_packet(&data) {
                status = self.handle_eof_packet(&data).or(status);
                break;
            }
            if is_err_packet(&data) {
                return Err(self.handle_err_packet(&data));
            }
            resultset.row_data.push(data);
        }

        Ok(QueryResult {
            status: status.unwrap_or_default(),
            resultset: Some(resultset),
            ..QueryResult::default()
        })
    }

    /// Reads column definitions up to an EOF, as sent for COM_FIELD_LIST and
    /// the metadata blocks of a prepare response.
    pub fn read_fields<T: Read + Write>(
        &mut self,
        transport: &mut PacketTransport<T>,
    ) -> Result<Vec<Field>, Error> {
        let mut fields = Vec::new();
        loop {
            let data = transport.read_packet()?;
            if is_eof_packet(&data) {
                self.handle_eof_packet(&data);
                return Ok(fields);
            }
            if is_err_packet(&data) {
                return Err(self.handle_err_packet(&data));
            }
            fields.push(Field::parse(&data)?);
        }
    }
}
