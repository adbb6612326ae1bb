use crate::{error::ProtocolError, protocol::codec::PacketReader};

use super::Position;

/// Size of the v4 common event header.
pub const EVENT_HEADER_SIZE: usize = 19;

pub mod event_type {
    pub const QUERY_EVENT: u8 = 0x02;
    pub const ROTATE_EVENT: u8 = 0x04;
    pub const FORMAT_DESCRIPTION_EVENT: u8 = 0x0f;
    pub const XID_EVENT: u8 = 0x10;
    pub const TABLE_MAP_EVENT: u8 = 0x13;
    pub const WRITE_ROWS_EVENT: u8 = 0x1e;
    pub const UPDATE_ROWS_EVENT: u8 = 0x1f;
    pub const DELETE_ROWS_EVENT: u8 = 0x20;
    pub const GTID_EVENT: u8 = 0x21;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: u8,
    pub server_id: u32,
    pub event_size: u32,
    /// Offset of the next event in the same file.
    pub log_pos: u32,
    pub flags: u16,
}

impl EventHeader {
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = PacketReader::new(data);
        let header = Self {
            timestamp: reader.read_u32()?,
            event_type: reader.read_u8()?,
            server_id: reader.read_u32()?,
            event_size: reader.read_u32()?,
            log_pos: reader.read_u32()?,
            flags: reader.read_u16()?,
        };
        if (header.event_size as usize) < EVENT_HEADER_SIZE {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(header)
    }
}

/// One replication event as produced by the binlog parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogEvent {
    pub file_name: String,
    pub header: EventHeader,
    pub raw_data: Vec<u8>,
}

impl BinlogEvent {
    /// Decodes the common header of `raw`, which must hold exactly one event.
    pub fn decode(file_name: impl Into<String>, raw: Vec<u8>) -> Result<Self, ProtocolError> {
        let header = EventHeader::decode(&raw)?;
        if header.event_size as usize != raw.len() {
            return Err(ProtocolError::MalformedPacket);
        }
        Ok(Self {
            file_name: file_name.into(),
            header,
            raw_data: raw,
        })
    }

    /// Where replication resumes after this event.
    pub fn position(&self) -> Position {
        Position::new(self.file_name.clone(), self.header.log_pos)
    }

    pub fn body(&self) -> &[u8] {
        &self.raw_data[EVENT_HEADER_SIZE..]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::codec::PacketWriter;

    pub(crate) fn raw_event(event_type: u8, log_pos: u32, body: &[u8]) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u32(1_700_000_000);
        w.write_u8(event_type);
        w.write_u32(7);
        w.write_u32((EVENT_HEADER_SIZE + body.len()) as u32);
        w.write_u32(log_pos);
        w.write_u16(0);
        w.write_bytes(body);
        w.into_bytes()
    }

    #[test]
    fn decodes_common_header() {
        let raw = raw_event(event_type::XID_EVENT, 4242, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let event = BinlogEvent::decode("mysql-bin.000003", raw).unwrap();

        assert_eq!(event.header.timestamp, 1_700_000_000);
        assert_eq!(event.header.event_type, event_type::XID_EVENT);
        assert_eq!(event.header.server_id, 7);
        assert_eq!(event.header.event_size, 27);
        assert_eq!(event.body().len(), 8);
        assert_eq!(event.position(), Position::new("mysql-bin.000003", 4242));
    }

    #[test]
    #[should_panic(expected = "MalformedPacket")]
    fn size_must_match() {
        let mut raw = raw_event(event_type::QUERY_EVENT, 100, b"abc");
        raw.push(0);
        BinlogEvent::decode("mysql-bin.000001", raw).unwrap();
    }

    #[test]
    #[should_panic(expected = "MalformedPacket")]
    fn short_header() {
        BinlogEvent::decode("mysql-bin.000001", vec![0; 10]).unwrap();
    }
}
