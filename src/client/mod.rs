//! Client side of the protocol.
//!
//! [`Conn`] authenticates with `mysql_native_password`, then issues commands
//! one at a time. Server errors leave the session usable; transport and
//! protocol errors close it.
mod conn;
mod stmt;

pub use conn::{Conn, ConnState};
pub use stmt::Stmt;
