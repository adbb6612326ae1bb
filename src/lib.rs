//! MySQL wire protocol building blocks.
//!
//! - [`protocol`]: packet framing and response codecs shared by both roles.
//! - [`client`]: a blocking client session.
//! - [`server`]: a command dispatcher serving a pluggable [`server::Handler`].
//! - [`replication`]: binlog events and the producer/consumer streamer.
//! - [`canal`]: the persisted replication checkpoint.
pub mod auth;
pub mod canal;
pub mod cli;
pub mod client;
pub mod error;
pub mod protocol;
pub mod replication;
pub mod server;

pub use cli::{Command, format_result, prompt};
pub use client::{Conn, Stmt};
pub use error::{Error, HandlerError, ProtocolError};
pub use protocol::{Field, MyError, QueryResult, Resultset, Value};
