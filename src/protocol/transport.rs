use std::io::{Read, Write};

use log::trace;

use crate::error::{Error, ProtocolError};

use super::consts::MAX_PAYLOAD_LEN;

const HEADER_SIZE: usize = 4;

/// Frames and deframes sequenced packets over a byte stream.
///
/// Every physical frame is `len: u24 LE` + `seq: u8` + payload. A logical
/// payload of `MAX_PAYLOAD_LEN` bytes or more is split across frames; when its
/// length is an exact multiple of the maximum, an empty frame terminates it.
pub struct PacketTransport<T: Read + Write> {
    stream: T,
    sequence: u8,
}

impl<T: Read + Write> PacketTransport<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            sequence: 0,
        }
    }

    /// Sequence number expected on the next frame read or written.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Starts a new command cycle.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    /// Reads one logical packet, reassembling split frames.
    pub fn read_packet(&mut self) -> Result<Vec<u8>, Error> {
        let mut payload = Vec::new();

        loop {
            let mut header = [0; HEADER_SIZE];
            self.stream.read_exact(&mut header)?;

            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let seq = header[3];
            if seq != self.sequence {
                return Err(ProtocolError::InvalidSequence {
                    expected: self.sequence,
                    got: seq,
                }
                .into());
            }
            self.sequence = self.sequence.wrapping_add(1);
            trace!("read frame seq={seq} len={len}");

            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream.read_exact(&mut payload[start..])?;

            if len < MAX_PAYLOAD_LEN {
                return Ok(payload);
            }
        }
    }

    /// Writes one logical packet, splitting it into frames as needed.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<(), Error> {
        let mut rest = payload;

        loop {
            let len = rest.len().min(MAX_PAYLOAD_LEN);
            let header = (len as u32).to_le_bytes();
            let header = [header[0], header[1], header[2], self.sequence];
            trace!("write frame seq={} len={len}", self.sequence);

            self.stream.write_all(&header)?;
            self.stream.write_all(&rest[..len])?;
            self.sequence = self.sequence.wrapping_add(1);
            rest = &rest[len..];

            if len < MAX_PAYLOAD_LEN {
                break;
            }
        }

        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use super::*;

    fn round_trip(payload: &[u8]) -> (Vec<u8>, usize) {
        let stream = Cursor::new(Vec::new());
        let mut transport = PacketTransport::new(stream);

        transport.write_packet(payload).unwrap();
        let written = transport.stream.get_ref().len();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        transport.reset_sequence();
        let read = transport.read_packet().unwrap();
        (read, written)
    }

    #[test]
    fn read_write_small_packet() {
        let (read, written) = round_trip(b"\x03SELECT 1");
        assert_eq!(read, b"\x03SELECT 1");
        assert_eq!(written, HEADER_SIZE + 9);
    }

    #[test]
    fn read_write_empty_packet() {
        let (read, written) = round_trip(&[]);
        assert!(read.is_empty());
        assert_eq!(written, HEADER_SIZE);
    }

    #[test]
    fn payload_just_under_max_is_one_frame() {
        let payload = vec![0xAB; MAX_PAYLOAD_LEN - 1];
        let (read, written) = round_trip(&payload);
        assert_eq!(read, payload);
        assert_eq!(written, HEADER_SIZE + payload.len());
    }

    #[test]
    fn payload_at_max_gets_empty_terminator() {
        let payload = vec![0x11; MAX_PAYLOAD_LEN];
        let (read, written) = round_trip(&payload);
        assert_eq!(read, payload);
        assert_eq!(written, 2 * HEADER_SIZE + payload.len());
    }

    #[test]
    fn payload_over_max_is_split() {
        let mut payload = vec![0x22; MAX_PAYLOAD_LEN + 1];
        payload[MAX_PAYLOAD_LEN] = 0x33;
        let (read, written) = round_trip(&payload);
        assert_eq!(read, payload);
        assert_eq!(written, 2 * HEADER_SIZE + payload.len());
    }

    #[test]
    fn sequence_advances_per_frame() {
        let mut transport = PacketTransport::new(Cursor::new(Vec::new()));
        transport.write_packet(&vec![0; MAX_PAYLOAD_LEN]).unwrap();
        assert_eq!(transport.sequence(), 2);
        transport.reset_sequence();
        assert_eq!(transport.sequence(), 0);
    }

    #[test]
    #[should_panic(expected = "InvalidSequence")]
    fn mismatched_sequence_is_fatal() {
        let bytes = vec![0x01, 0x00, 0x00, 0x05, 0x0e];
        let mut transport = PacketTransport::new(Cursor::new(bytes));
        transport.read_packet().unwrap();
    }

    #[test]
    fn truncated_frame_is_transport_error() {
        let bytes = vec![0x05, 0x00, 0x00, 0x00, 0x03];
        let mut transport = PacketTransport::new(Cursor::new(bytes));
        let err = transport.read_packet().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
