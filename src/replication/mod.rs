//! Binlog event hand-off between a replication parser and its consumer.
pub mod event;
mod position;
mod streamer;

pub use event::{BinlogEvent, EventHeader};
pub use position::Position;
pub use streamer::{BinlogStreamer, StreamError};
