use crate::{
    error::HandlerError,
    protocol::{Field, QueryResult, Value},
};

/// The SQL engine behind a [`Session`](super::Session).
///
/// Errors that are a [`MyError`](crate::protocol::MyError) reach the client
/// unchanged; any other error is reported as `ER_UNKNOWN_ERROR`.
pub trait Handler {
    /// Per-statement state kept from prepare until close.
    type Context;

    /// COM_INIT_DB. Reject unknown databases here.
    fn use_db(&mut self, db: &str) -> Result<(), HandlerError>;

    /// COM_QUERY. A result carrying a resultset is sent as rows, otherwise as OK.
    fn handle_query(&mut self, query: &str) -> Result<QueryResult, HandlerError>;

    /// COM_FIELD_LIST.
    fn handle_field_list(&mut self, table: &str, wildcard: &str)
    -> Result<Vec<Field>, HandlerError>;

    /// COM_STMT_PREPARE. Returns the parameter count, the column count and a
    /// context handed back on every execution.
    fn handle_stmt_prepare(
        &mut self,
        query: &str,
    ) -> Result<(u16, u16, Self::Context), HandlerError>;

    /// COM_STMT_EXECUTE with the prepared query and decoded arguments.
    fn handle_stmt_execute(
        &mut self,
        context: &mut Self::Context,
        query: &str,
        args: &[Value],
    ) -> Result<QueryResult, HandlerError>;
}

/// Accepts any database and rejects every other command.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyHandler;

impl Handler for EmptyHandler {
    type Context = ();

    fn use_db(&mut self, _db: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    fn handle_query(&mut self, _query: &str) -> Result<QueryResult, HandlerError> {
        Err("not supported now".into())
    }

    fn handle_field_list(
        &mut self,
        _table: &str,
        _wildcard: &str,
    ) -> Result<Vec<Field>, HandlerError> {
        Err("not supported now".into())
    }

    fn handle_stmt_prepare(&mut self, _query: &str) -> Result<(u16, u16, ()), HandlerError> {
        Err("not supported now".into())
    }

    fn handle_stmt_execute(
        &mut self,
        _context: &mut (),
        _query: &str,
        _args: &[Value],
    ) -> Result<QueryResult, HandlerError> {
        Err("not supported now".into())
    }
}
