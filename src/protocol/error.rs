use std::fmt;

use super::consts::error_code::{ER_ACCESS_DENIED_ERROR, ER_UNKNOWN_COM_ERROR};

/// An ERR packet sent by (or to) the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MyError {
    pub code: u16,
    /// SQL state, only present on 4.1-protocol connections.
    pub state: Option<[u8; 5]>,
    pub message: String,
}

impl MyError {
    /// Creates an error with the SQL state conventionally paired with `code`.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            state: Some(default_state(code)),
            message: message.into(),
        }
    }

    pub fn state_str(&self) -> Option<&str> {
        self.state
            .as_ref()
            .and_then(|state| std::str::from_utf8(state).ok())
    }
}

fn default_state(code: u16) -> [u8; 5] {
    match code {
        ER_ACCESS_DENIED_ERROR => *b"28000",
        ER_UNKNOWN_COM_ERROR => *b"08S01",
        _ => *b"HY000",
    }
}

impl fmt::Display for MyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state_str() {
            Some(state) => write!(f, "ERROR {} ({}): {}", self.code, state, self.message),
            None => write!(f, "ERROR {}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for MyError {}
