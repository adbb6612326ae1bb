//! Server side of the protocol.
//!
//! A [`Session`] owns one connection. Each cycle it reads a command, hands it
//! to the [`Handler`], writes exactly one [`Response`] (or none, for the
//! commands that expect none) and resets the packet sequence. Prepared
//! statements live in a per-session arena and die with the session.
//!
//! [`Server`] accepts TCP connections and runs every session on a worker of a
//! fixed [`ThreadPool`].
mod command;
mod conn;
mod handler;
mod listener;
mod resp;
mod stmt;
mod thread;

pub use conn::{Credentials, Session};
pub use handler::{EmptyHandler, Handler};
pub use listener::Server;
pub use resp::Response;
pub use stmt::{Statement, StatementTable};
pub use thread::ThreadPool;
