use std::io::{Read, Write};

use log::{debug, warn};

use crate::{
    error::{HandlerError, ProtocolError},
    protocol::{
        MyError, QueryResult, Value,
        codec::PacketReader,
        consts::{
            command::{
                COM_FIELD_LIST, COM_INIT_DB, COM_PING, COM_QUERY, COM_QUIT, COM_STMT_CLOSE,
                COM_STMT_EXECUTE, COM_STMT_PREPARE, COM_STMT_RESET, COM_STMT_SEND_LONG_DATA,
            },
            error_code::{
                ER_MAX_PREPARED_STMT_COUNT_REACHED, ER_UNKNOWN_COM_ERROR, ER_UNKNOWN_ERROR,
                ER_UNKNOWN_STMT_HANDLER,
            },
        },
    },
};

use super::{Handler, Session, resp::Response, stmt::Statement};

fn unknown_statement(id: u32, command: &str) -> MyError {
    MyError::new(
        ER_UNKNOWN_STMT_HANDLER,
        format!("Unknown prepared statement handler ({id}) given to {command}"),
    )
}

impl<H: Handler, S: Read + Write> Session<H, S> {
    /// Runs one command against the handler and picks the response.
    pub(super) fn dispatch(&mut self, data: &[u8]) -> Response {
        let (command, data) = (data[0], &data[1..]);
        debug!("dispatching command {command:#04x}");

        match command {
            COM_QUIT => {
                self.close();
                Response::None
            }
            COM_QUERY => {
                let query = String::from_utf8_lossy(data);
                match self.handler.handle_query(&query) {
                    Ok(result) => Response::from_result(result),
                    Err(e) => Response::from_error(e),
                }
            }
            COM_PING => Response::Ok(None),
            COM_INIT_DB => {
                let db = String::from_utf8_lossy(data);
                match self.handler.use_db(&db) {
                    Ok(()) => {
                        self.db = db.into_owned();
                        Response::Ok(None)
                    }
                    Err(e) => Response::from_error(e),
                }
            }
            COM_FIELD_LIST => {
                let (table, wildcard) = match data.iter().position(|&b| b == 0) {
                    Some(i) => (&data[..i], &data[i + 1..]),
                    None => (data, &[][..]),
                };
                let table = String::from_utf8_lossy(table);
                let wildcard = String::from_utf8_lossy(wildcard);
                match self.handler.handle_field_list(&table, &wildcard) {
                    Ok(fields) => Response::FieldList(fields),
                    Err(e) => Response::from_error(e),
                }
            }
            COM_STMT_PREPARE => self.handle_stmt_prepare(data),
            COM_STMT_EXECUTE => match self.handle_stmt_execute(data) {
                Ok(result) => Response::from_result(result),
                Err(e) => Response::from_error(e),
            },
            COM_STMT_SEND_LONG_DATA => {
                self.handle_stmt_send_long_data(data);
                Response::None
            }
            COM_STMT_RESET => self.handle_stmt_reset(data),
            COM_STMT_CLOSE => {
                self.handle_stmt_close(data);
                Response::None
            }
            _ => Response::Error(MyError::new(
                ER_UNKNOWN_COM_ERROR,
                format!("command {command} is not supported now"),
            )),
        }
    }

    fn handle_stmt_prepare(&mut self, data: &[u8]) -> Response {
        let query = String::from_utf8_lossy(data).into_owned();
        let Some(id) = self.stmts.next_id() else {
            warn!("statement ids exhausted for this session");
            return Response::Error(MyError::new(
                ER_MAX_PREPARED_STMT_COUNT_REACHED,
                "Can't create more prepared statements on this connection",
            ));
        };

        match self.handler.handle_stmt_prepare(&query) {
            Ok((params, columns, context)) => {
                debug!("prepared statement {id} with {params} params");
                self.stmts
                    .insert(Statement::new(id, query, params, columns, context));
                Response::Prepared {
                    id,
                    params,
                    columns,
                }
            }
            Err(e) => Response::from_error(e),
        }
    }

    fn handle_stmt_execute(&mut self, data: &[u8]) -> Result<QueryResult, HandlerError> {
        let mut reader = PacketReader::new(data);
        let id = reader.read_u32()?;
        let stmt = self
            .stmts
            .get_mut(id)
            .ok_or_else(|| unknown_statement(id, "stmt_execute"))?;

        let result = execute_statement(&mut self.handler, stmt, &mut reader);
        stmt.reset_params();
        result
    }

    fn handle_stmt_send_long_data(&mut self, data: &[u8]) {
        let mut reader = PacketReader::new(data);
        let (Ok(id), Ok(param)) = (reader.read_u32(), reader.read_u16()) else {
            warn!("malformed long data packet");
            return;
        };

        match self.stmts.get_mut(id) {
            Some(stmt) => {
                if !stmt.append_long_data(param, reader.read_rest()) {
                    warn!("long data for parameter {param} of statement {id} out of range");
                }
            }
            None => warn!("long data for unknown statement {id}"),
        }
    }

    fn handle_stmt_reset(&mut self, data: &[u8]) -> Response {
        let id = match PacketReader::new(data).read_u32() {
            Ok(id) => id,
            Err(e) => return Response::from_error(e.into()),
        };
        match self.stmts.get_mut(id) {
            Some(stmt) => {
                stmt.reset_params();
                Response::Ok(None)
            }
            None => Response::Error(unknown_statement(id, "stmt_reset")),
        }
    }

    fn handle_stmt_close(&mut self, data: &[u8]) {
        let Ok(id) = PacketReader::new(data).read_u32() else {
            warn!("malformed statement close packet");
            return;
        };
        if self.stmts.remove(id).is_none() {
            warn!("close for unknown statement {id}");
        }
    }
}

/// Runs the rest of a COM_STMT_EXECUTE. The caller clears long data
/// afterwards, whatever the outcome.
fn execute_statement<H: Handler>(
    handler: &mut H,
    stmt: &mut Statement<H::Context>,
    reader: &mut PacketReader<'_>,
) -> Result<QueryResult, HandlerError> {
    let flags = reader.read_u8()?;
    if flags != 0 {
        return Err(MyError::new(
            ER_UNKNOWN_ERROR,
            format!("unsupported cursor flags {flags:#04x}"),
        )
        .into());
    }
    // iteration count, always 1
    reader.skip(4)?;

    let args = read_params(stmt, reader)?;
    handler.handle_stmt_execute(&mut stmt.context, &stmt.query, &args)
}

/// Decodes the parameter block of COM_STMT_EXECUTE. Long data already sent for a
/// slot takes precedence over the packet.
fn read_params<C>(
    stmt: &mut Statement<C>,
    reader: &mut PacketReader<'_>,
) -> Result<Vec<Value>, ProtocolError> {
    let count = usize::from(stmt.params);
    if count == 0 {
        return Ok(Vec::new());
    }

    let null_bitmap = reader.read_bytes(count.div_ceil(8))?;
    if reader.read_u8()? == 1 {
        stmt.param_types = reader.read_bytes(count * 2)?.to_vec();
    }

    let mut args = Vec::with_capacity(count);
    for i in 0..count {
        if let Some(value) = stmt.bound_params[i].take() {
            args.push(value);
            continue;
        }
        if null_bitmap[i / 8] & (1 << (i % 8)) != 0 {
            args.push(Value::Null);
            continue;
        }
        let (field_type, unsigned) = stmt
            .param_type(i)
            .ok_or(ProtocolError::MalformedPacket)?;
        args.push(Value::read_binary(reader, field_type, unsigned)?);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::{
        error::Error,
        protocol::{
            Field, Resultset,
            codec::PacketWriter,
            consts::{
                capability::{CLIENT_PROTOCOL_41, CLIENT_TRANSACTIONS},
                field_type::{MYSQL_TYPE_LONGLONG, MYSQL_TYPE_TIME, MYSQL_TYPE_VAR_STRING},
            },
            response::parse_err_packet,
            value::PARAM_UNSIGNED,
        },
        server::EmptyHandler,
    };

    const CAP: u32 = CLIENT_PROTOCOL_41 | CLIENT_TRANSACTIONS;

    /// Feeds client commands and collects the server's frames.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn commands(packets: &[Vec<u8>]) -> MockStream {
        let mut input = Vec::new();
        for payload in packets {
            input.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
            input.push(0);
            input.extend_from_slice(payload);
        }
        MockStream {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }

    fn frames(mut data: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut out = Vec::new();
        while !data.is_empty() {
            let len = u32::from_le_bytes([data[0], data[1], data[2], 0]) as usize;
            out.push((data[3], data[4..4 + len].to_vec()));
            data = &data[4 + len..];
        }
        out
    }

    fn command(code: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = vec![code];
        data.extend_from_slice(payload);
        data
    }

    #[derive(Default)]
    struct Recorder {
        executed: Vec<(String, Vec<Value>)>,
    }

    impl Handler for Recorder {
        type Context = u32;

        fn use_db(&mut self, db: &str) -> Result<(), HandlerError> {
            if db == "missing" {
                return Err(MyError::new(1049, "Unknown database 'missing'").into());
            }
            Ok(())
        }

        fn handle_query(&mut self, query: &str) -> Result<QueryResult, HandlerError> {
            match query {
                "SELECT 1" => {
                    let rs = Resultset::from_text_rows(&["1"], &[vec![Value::from(1_i64)]])?;
                    Ok(QueryResult::with_resultset(rs))
                }
                "DELETE FROM t" => Ok(QueryResult::ok(4, 0)),
                _ => Err(format!("cannot run {query}").into()),
            }
        }

        fn handle_field_list(
            &mut self,
            table: &str,
            wildcard: &str,
        ) -> Result<Vec<Field>, HandlerError> {
            Ok(vec![
                Field::new(table, MYSQL_TYPE_LONGLONG),
                Field::new(wildcard, MYSQL_TYPE_VAR_STRING),
            ])
        }

        fn handle_stmt_prepare(
            &mut self,
            query: &str,
        ) -> Result<(u16, u16, Self::Context), HandlerError> {
            let params = query.matches('?').count() as u16;
            Ok((params, 0, 0))
        }

        fn handle_stmt_execute(
            &mut self,
            context: &mut u32,
            query: &str,
            args: &[Value],
        ) -> Result<QueryResult, HandlerError> {
            *context += 1;
            self.executed.push((query.to_string(), args.to_vec()));
            Ok(QueryResult::ok(u64::from(*context), 0))
        }
    }

    fn session(packets: &[Vec<u8>]) -> Session<Recorder, MockStream> {
        Session::new(commands(packets), Recorder::default(), CAP)
    }

    fn output<H: Handler>(session: &Session<H, MockStream>) -> Vec<(u8, Vec<u8>)> {
        frames(&session.transport.as_ref().unwrap().get_ref().output)
    }

    fn execute_packet(id: u32, types: &[(u8, u8)], values: &[Value], nulls: u8) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(COM_STMT_EXECUTE);
        w.write_u32(id);
        w.write_u8(0);
        w.write_u32(1);
        w.write_u8(nulls);
        w.write_u8(1);
        for (t, flag) in types {
            w.write_u8(*t);
            w.write_u8(*flag);
        }
        for v in values {
            v.write_binary(&mut w);
        }
        w.into_bytes()
    }

    #[test]
    fn select_one_is_five_packets() {
        let mut session = session(&[command(COM_QUERY, b"SELECT 1")]);
        session.handle_command().unwrap();

        let out = output(&session);
        let seqs: Vec<u8> = out.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, [1, 2, 3, 4, 5]);
        assert_eq!(out[0].1, [1]);
        assert_eq!(Field::parse(&out[1].1).unwrap().name, "1");
        assert_eq!(out[3].1, b"\x011");
        assert_eq!(session.transport.as_ref().unwrap().sequence(), 0);
    }

    #[test]
    fn sequence_restarts_per_command() {
        let mut session = session(&[command(COM_PING, &[]), command(COM_PING, &[])]);
        session.handle_command().unwrap();
        session.handle_command().unwrap();

        let out = output(&session);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(seq, data)| *seq == 1 && data[0] == 0));
    }

    #[test]
    fn handler_error_keeps_connection() {
        let mut session = session(&[
            command(COM_QUERY, b"DROP TABLE t"),
            command(COM_QUERY, b"DELETE FROM t"),
        ]);
        session.handle_command().unwrap();
        session.handle_command().unwrap();
        assert!(!session.is_closed());

        let out = output(&session);
        let err = parse_err_packet(&out[0].1, CAP).unwrap();
        assert_eq!(err.code, ER_UNKNOWN_ERROR);
        assert_eq!(err.message, "cannot run DROP TABLE t");
        assert_eq!(out[1].1[..2], [0, 4]);
    }

    #[test]
    fn unsupported_command() {
        let mut session = session(&[command(0x1f, &[])]);
        session.handle_command().unwrap();

        let err = parse_err_packet(&output(&session)[0].1, CAP).unwrap();
        assert_eq!(err.code, ER_UNKNOWN_COM_ERROR);
        assert_eq!(err.message, "command 31 is not supported now");
        assert!(!session.is_closed());
    }

    #[test]
    fn init_db() {
        let mut session = session(&[
            command(COM_INIT_DB, b"missing"),
            command(COM_INIT_DB, b"shop"),
        ]);
        session.handle_command().unwrap();
        assert_eq!(session.db(), "");
        session.handle_command().unwrap();
        assert_eq!(session.db(), "shop");

        let out = output(&session);
        assert_eq!(parse_err_packet(&out[0].1, CAP).unwrap().code, 1049);
        assert_eq!(out[1].1[0], 0);
    }

    #[test]
    fn field_list_splits_table_and_wildcard() {
        let mut session = session(&[command(COM_FIELD_LIST, b"users\0na%")]);
        session.handle_command().unwrap();

        let out = output(&session);
        assert_eq!(out.len(), 3);
        assert_eq!(Field::parse(&out[0].1).unwrap().name, "users");
        assert_eq!(Field::parse(&out[1].1).unwrap().name, "na%");
        assert_eq!(out[2].1[0], 0xfe);
    }

    #[test]
    fn quit_closes_without_reply() {
        let mut session = session(&[command(COM_QUIT, &[])]);
        session.run().unwrap();
        assert!(session.is_closed());
        assert!(matches!(session.handle_command(), Err(Error::Closed)));
    }

    #[test]
    fn truncated_stream_closes() {
        let mut session = session(&[]);
        let err = session.handle_command().unwrap_err();
        assert!(err.is_fatal());
        assert!(session.is_closed());
    }

    #[test]
    fn statement_lifecycle() {
        let mut session = session(&[
            command(COM_STMT_PREPARE, b"SELECT ?"),
            command(COM_STMT_PREPARE, b"SELECT ?, ?"),
            execute_packet(1, &[(MYSQL_TYPE_LONGLONG, PARAM_UNSIGNED)], &[Value::from(7_u64)], 0),
            command(COM_STMT_CLOSE, &1u32.to_le_bytes()),
            execute_packet(1, &[(MYSQL_TYPE_LONGLONG, 0)], &[Value::from(7_i64)], 0),
            command(COM_STMT_RESET, &1u32.to_le_bytes()),
        ]);
        for _ in 0..6 {
            session.handle_command().unwrap();
        }

        let out = output(&session);
        // prepare 1: OK, one param definition, EOF
        assert_eq!(out[0].1[1..5], 1u32.to_le_bytes());
        assert_eq!(out[2].1[0], 0xfe);
        // prepare 2: OK, two param definitions, EOF
        assert_eq!(out[3].1[1..5], 2u32.to_le_bytes());
        assert_eq!(out[3].1[7..9], 2u16.to_le_bytes());
        assert_eq!(out[6].1[0], 0xfe);
        // execute
        assert_eq!(out[7].1[..2], [0, 1]);
        // close is silent, then both follow-ups fail
        assert_eq!(parse_err_packet(&out[8].1, CAP).unwrap().code, ER_UNKNOWN_STMT_HANDLER);
        assert_eq!(parse_err_packet(&out[9].1, CAP).unwrap().code, ER_UNKNOWN_STMT_HANDLER);
        assert_eq!(out.len(), 10);

        assert_eq!(
            session.handler().executed,
            [("SELECT ?".to_string(), vec![Value::Unsigned(7)])]
        );
    }

    #[test]
    fn long_data_takes_precedence() {
        let mut long_data = vec![COM_STMT_SEND_LONG_DATA];
        long_data.extend_from_slice(&1u32.to_le_bytes());
        long_data.extend_from_slice(&1u16.to_le_bytes());
        long_data.extend_from_slice(b"blob");

        let types = [(MYSQL_TYPE_LONGLONG, 0), (MYSQL_TYPE_VAR_STRING, 0)];
        let mut session = session(&[
            command(COM_STMT_PREPARE, b"INSERT INTO t VALUES (?, ?)"),
            long_data,
            execute_packet(1, &types, &[Value::from(1_i64)], 0b10),
            // types stay bound, long data is gone
            {
                let mut w = PacketWriter::new();
                w.write_u8(COM_STMT_EXECUTE);
                w.write_u32(1);
                w.write_u8(0);
                w.write_u32(1);
                w.write_u8(0b10);
                w.write_u8(0);
                Value::from(2_i64).write_binary(&mut w);
                w.into_bytes()
            },
        ]);
        for _ in 0..4 {
            session.handle_command().unwrap();
        }

        let executed = &session.handler().executed;
        assert_eq!(executed[0].1, [Value::from(1_i64), Value::from("blob")]);
        assert_eq!(executed[1].1, [Value::from(2_i64), Value::Null]);
    }

    #[test]
    fn cursor_flags_are_rejected() {
        let mut execute = execute_packet(1, &[(MYSQL_TYPE_LONGLONG, 0)], &[Value::from(1_i64)], 0);
        execute[5] = 1;
        let mut session = session(&[command(COM_STMT_PREPARE, b"SELECT ?"), execute]);
        session.handle_command().unwrap();
        session.handle_command().unwrap();

        let out = output(&session);
        let err = parse_err_packet(&out.last().unwrap().1, CAP).unwrap();
        assert!(err.message.contains("cursor"));
        assert!(session.handler().executed.is_empty());
    }

    #[test]
    fn rejected_execute_clears_long_data() {
        let mut long_data = vec![COM_STMT_SEND_LONG_DATA];
        long_data.extend_from_slice(&1u32.to_le_bytes());
        long_data.extend_from_slice(&1u16.to_le_bytes());
        long_data.extend_from_slice(b"stale");

        let types = [(MYSQL_TYPE_LONGLONG, 0), (MYSQL_TYPE_VAR_STRING, 0)];
        let mut with_cursor = execute_packet(1, &types, &[Value::from(1_i64)], 0b10);
        with_cursor[5] = 1;
        let mut session = session(&[
            command(COM_STMT_PREPARE, b"INSERT INTO t VALUES (?, ?)"),
            long_data,
            with_cursor,
            execute_packet(1, &types, &[Value::from(2_i64)], 0b10),
        ]);
        for _ in 0..4 {
            session.handle_command().unwrap();
        }

        let executed = &session.handler().executed;
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].1, [Value::from(2_i64), Value::Null]);
    }

    #[test]
    fn time_param_with_huge_day_count() {
        let days = vec![0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0];
        let mut session = session(&[
            command(COM_STMT_PREPARE, b"SELECT ?"),
            execute_packet(1, &[(MYSQL_TYPE_TIME, 0)], &[Value::Bytes(days)], 0),
        ]);
        session.handle_command().unwrap();
        session.handle_command().unwrap();

        assert!(!session.is_closed());
        assert_eq!(
            session.handler().executed[0].1,
            [Value::from("103079215080:00:00")]
        );
    }

    #[test]
    fn prepare_fails_once_ids_run_out() {
        let mut session = session(&[
            command(COM_STMT_PREPARE, b"SELECT ?"),
            command(COM_STMT_PREPARE, b"SELECT ?"),
        ]);
        session.stmts.next_id = u32::MAX - 1;
        session.handle_command().unwrap();
        session.handle_command().unwrap();

        let out = output(&session);
        assert_eq!(out[0].1[1..5], u32::MAX.to_le_bytes());
        let err = parse_err_packet(&out.last().unwrap().1, CAP).unwrap();
        assert_eq!(err.code, ER_MAX_PREPARED_STMT_COUNT_REACHED);
        assert_eq!(session.stmts.len(), 1);
        assert!(!session.is_closed());
    }

    #[test]
    fn empty_handler_rejects_queries() {
        let mut session = Session::new(
            commands(&[command(COM_INIT_DB, b"any"), command(COM_QUERY, b"SELECT 1")]),
            EmptyHandler,
            CAP,
        );
        session.handle_command().unwrap();
        session.handle_command().unwrap();

        let out = output(&session);
        assert_eq!(out[0].1[0], 0);
        let err = parse_err_packet(&out[1].1, CAP).unwrap();
        assert_eq!(err.message, "not supported now");
    }
}
