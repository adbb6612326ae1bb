//! MySQL client/server wire protocol.
//!
//! This module holds everything both connection roles share: the packet
//! framer, payload codecs, column definitions, typed values, and the decoding
//! (and re-encoding) of command responses.
//!
//! # Overview
//!
//! Every message on the wire is a *packet*: a 4 byte header followed by the
//! payload. The header carries the payload length (3 bytes, little-endian) and
//! a sequence number that starts at zero for each command and increases by
//! one per physical frame in either direction.
//!
//! Payloads of `2^24 - 1` bytes or more are split across several frames. A
//! payload whose length is an exact multiple of the frame limit is followed by
//! an empty frame so the reader knows where it ends.
//!
//! # Key Components
//!
//! - [`PacketTransport`]: frames and deframes packets over any `Read + Write` stream.
//! - [`ResultDecoder`]: turns OK / ERR / EOF / resultset packets into a [`QueryResult`].
//! - [`Resultset`]: column definitions plus raw rows, parsed into [`Value`]s on demand.
//! - [`MyError`]: an ERR packet sent by the peer.
//!
//! # Capabilities
//!
//! Several payload layouts depend on the capability flags agreed during the
//! handshake. `CLIENT_PROTOCOL_41` adds status flags to OK/EOF packets and a
//! SQL state to ERR packets; without it, `CLIENT_TRANSACTIONS` still adds the
//! status flags to OK packets.
//!
//! # See Also
//!
//! - [`client`](crate::client): drives a connection as a client.
//! - [`server`](crate::server): answers commands on behalf of a [`Handler`](crate::server::Handler).
pub mod codec;
pub mod consts;
mod error;
pub mod field;
pub mod response;
pub mod result;
mod transport;
pub mod value;

pub use error::MyError;
pub use field::Field;
pub use response::ResultDecoder;
pub use result::{QueryResult, Resultset, RowData};
pub use transport::PacketTransport;
pub use value::Value;
