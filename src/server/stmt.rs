use std::collections::HashMap;

use crate::protocol::{Value, value::PARAM_UNSIGNED};

/// A prepared statement as tracked by the server.
#[derive(Debug)]
pub struct Statement<C> {
    pub id: u32,
    pub query: String,
    pub params: u16,
    pub columns: u16,
    /// Two bytes per parameter (type, flags) as last bound by the client.
    pub param_types: Vec<u8>,
    /// Values supplied through COM_STMT_SEND_LONG_DATA.
    pub bound_params: Vec<Option<Value>>,
    pub context: C,
}

impl<C> Statement<C> {
    pub fn new(id: u32, query: String, params: u16, columns: u16, context: C) -> Self {
        let mut stmt = Self {
            id,
            query,
            params,
            columns,
            param_types: Vec::new(),
            bound_params: Vec::new(),
            context,
        };
        stmt.reset_params();
        stmt
    }

    /// Clears long data. Parameter types stay bound until the client sends new ones.
    pub fn reset_params(&mut self) {
        self.bound_params = vec![None; usize::from(self.params)];
    }

    /// Appends a long data chunk, returning false when `param` is out of range.
    pub fn append_long_data(&mut self, param: u16, chunk: &[u8]) -> bool {
        match self.bound_params.get_mut(usize::from(param)) {
            Some(Some(Value::Bytes(data))) => {
                data.extend_from_slice(chunk);
                true
            }
            Some(slot) => {
                *slot = Some(Value::Bytes(chunk.to_vec()));
                true
            }
            None => false,
        }
    }

    /// The (type, unsigned) pair bound for `param`.
    pub fn param_type(&self, param: usize) -> Option<(u8, bool)> {
        let pair = self.param_types.get(param * 2..param * 2 + 2)?;
        Some((pair[0], pair[1] & PARAM_UNSIGNED != 0))
    }
}

/// Per-session statement arena. Ids increase monotonically and are never reused.
#[derive(Debug)]
pub struct StatementTable<C> {
    pub(super) next_id: u32,
    stmts: HashMap<u32, Statement<C>>,
}

impl<C> Default for StatementTable<C> {
    fn default() -> Self {
        Self {
            next_id: 0,
            stmts: HashMap::new(),
        }
    }
}

impl<C> StatementTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id, or `None` once the id space is used up.
    pub fn next_id(&mut self) -> Option<u32> {
        self.next_id = self.next_id.checked_add(1)?;
        Some(self.next_id)
    }

    pub fn insert(&mut self, stmt: Statement<C>) {
        self.stmts.insert(stmt.id, stmt);
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Statement<C>> {
        self.stmts.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Statement<C>> {
        self.stmts.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let mut table = StatementTable::new();
        let a = table.next_id().unwrap();
        table.insert(Statement::new(a, "SELECT ?".to_string(), 1, 1, ()));
        table.remove(a);
        let b = table.next_id().unwrap();

        assert!(b > a);
        assert!(table.get_mut(a).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn ids_run_out_instead_of_wrapping() {
        let mut table = StatementTable::<()>::new();
        table.next_id = u32::MAX - 1;

        assert_eq!(table.next_id(), Some(u32::MAX));
        assert_eq!(table.next_id(), None);
        assert_eq!(table.next_id(), None);
    }

    #[test]
    fn long_data_accumulates() {
        let mut stmt = Statement::new(1, String::new(), 2, 0, ());
        assert!(stmt.append_long_data(1, b"ab"));
        assert!(stmt.append_long_data(1, b"cd"));
        assert!(!stmt.append_long_data(2, b"x"));
        assert_eq!(stmt.bound_params[1], Some(Value::from("abcd")));

        stmt.reset_params();
        assert_eq!(stmt.bound_params, vec![None, None]);
    }

    #[test]
    fn param_types_decode_unsigned() {
        let mut stmt = Statement::new(1, String::new(), 2, 0, ());
        assert_eq!(stmt.param_type(0), None);
        stmt.param_types = vec![8, PARAM_UNSIGNED, 253, 0];
        assert_eq!(stmt.param_type(0), Some((8, true)));
        assert_eq!(stmt.param_type(1), Some((253, false)));
    }
}
