use std::io::{Read, Write};

use log::debug;

use crate::{
    error::{Error, ProtocolError},
    protocol::{
        Field, QueryResult, Value,
        codec::{PacketReader, PacketWriter},
        consts::{
            ERR_HEADER, OK_HEADER,
            command::{
                COM_STMT_CLOSE, COM_STMT_EXECUTE, COM_STMT_PREPARE, COM_STMT_RESET,
                COM_STMT_SEND_LONG_DATA,
            },
        },
        value::PARAM_UNSIGNED,
    },
};

use super::conn::{Conn, write_command};

/// A server-side prepared statement, borrowed from its session.
pub struct Stmt<'a, S: Read + Write> {
    conn: &'a mut Conn<S>,
    id: u32,
    params: u16,
    columns: u16,
    param_fields: Vec<Field>,
    column_fields: Vec<Field>,
}

impl<'a, S: Read + Write> Stmt<'a, S> {
    pub(crate) fn prepare(conn: &'a mut Conn<S>, query: &str) -> Result<Self, Error> {
        let (id, params, columns, param_fields, column_fields) =
            conn.run(|transport, decoder| {
                write_command(transport, COM_STMT_PREPARE, query.as_bytes())?;

                let data = transport.read_packet()?;
                match data.first() {
                    Some(&OK_HEADER) => {}
                    Some(&ERR_HEADER) => return Err(decoder.handle_err_packet(&data)),
                    _ => return Err(ProtocolError::MalformedPacket.into()),
                }

                let mut reader = PacketReader::new(&data);
                reader.skip(1)?;
                let id = reader.read_u32()?;
                let columns = reader.read_u16()?;
                let params = reader.read_u16()?;

                let param_fields = if params > 0 {
                    decoder.read_fields(transport)?
                } else {
                    Vec::new()
                };
                let column_fields = if columns > 0 {
                    decoder.read_fields(transport)?
                } else {
                    Vec::new()
                };
                Ok((id, params, columns, param_fields, column_fields))
            })?;

        debug!("prepared statement {id}: {params} params, {columns} columns");
        Ok(Self {
            conn,
            id,
            params,
            columns,
            param_fields,
            column_fields,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn param_num(&self) -> usize {
        usize::from(self.params)
    }

    pub fn column_num(&self) -> usize {
        usize::from(self.columns)
    }

    pub fn param_fields(&self) -> &[Field] {
        &self.param_fields
    }

    pub fn column_fields(&self) -> &[Field] {
        &self.column_fields
    }

    /// Executes with `args` bound in order. Rows come back in the binary encoding.
    pub fn execute(&mut self, args: &[Value]) -> Result<QueryResult, Error> {
        if args.len() != self.param_num() {
            return Err(Error::Application(
                format!(
                    "statement {} expects {} arguments, got {}",
                    self.id,
                    self.params,
                    args.len()
                )
                .into(),
            ));
        }

        let payload = self.execute_packet(args);
        self.conn.run(|transport, decoder| {
            write_command(transport, COM_STMT_EXECUTE, &payload)?;
            decoder.read_result(transport, true)
        })
    }

    fn execute_packet(&self, args: &[Value]) -> Vec<u8> {
        let mut writer = PacketWriter::with_capacity(16 + args.len() * 10);
        writer.write_u32(self.id);
        // no cursor
        writer.write_u8(0);
        writer.write_u32(1);

        if !args.is_empty() {
            let mut bitmap = vec![0u8; args.len().div_ceil(8)];
            for (i, arg) in args.iter().enumerate() {
                if arg.is_null() {
                    bitmap[i / 8] |= 1 << (i % 8);
                }
            }
            writer.write_bytes(&bitmap);

            writer.write_u8(1);
            for arg in args {
                let (field_type, unsigned) = arg.binary_type();
                writer.write_u8(field_type);
                writer.write_u8(if unsigned { PARAM_UNSIGNED } else { 0 });
            }
            for arg in args {
                arg.write_binary(&mut writer);
            }
        }
        writer.into_bytes()
    }

    /// Streams a chunk of data for parameter `param`. The server does not reply.
    pub fn send_long_data(&mut self, param: u16, data: &[u8]) -> Result<(), Error> {
        let mut writer = PacketWriter::with_capacity(6 + data.len());
        writer.write_u32(self.id);
        writer.write_u16(param);
        writer.write_bytes(data);

        self.conn.run(|transport, _| {
            write_command(transport, COM_STMT_SEND_LONG_DATA, writer.as_bytes())
        })
    }

    /// Discards long data sent for this statement.
    pub fn reset(&mut self) -> Result<(), Error> {
        let id = self.id.to_le_bytes();
        self.conn
            .run(|transport, decoder| {
                write_command(transport, COM_STMT_RESET, &id)?;
                decoder.read_ok(transport)
            })
            .map(|_| ())
    }

    /// Deallocates the statement on the server. The server does not reply.
    pub fn close(self) -> Result<(), Error> {
        let id = self.id.to_le_bytes();
        self.conn
            .run(|transport, _| write_command(transport, COM_STMT_CLOSE, &id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::conn::tests::{CAP, connected, err, ok, sent},
        protocol::{
            Resultset,
            consts::field_type::{MYSQL_TYPE_LONGLONG, MYSQL_TYPE_VAR_STRING},
            response::dump_eof_packet,
        },
    };

    fn prepare_ok(id: u32, columns: u16, params: u16) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_u8(OK_HEADER);
        w.write_u32(id);
        w.write_u16(columns);
        w.write_u16(params);
        w.write_u8(0);
        w.write_u16(0);
        w.into_bytes()
    }

    fn prepare_reply(id: u32) -> Vec<Vec<u8>> {
        vec![
            prepare_ok(id, 1, 2),
            Field::new("?", MYSQL_TYPE_LONGLONG).dump(),
            Field::new("?", MYSQL_TYPE_VAR_STRING).dump(),
            dump_eof_packet(0, CAP),
            Field::new("n", MYSQL_TYPE_LONGLONG).dump(),
            dump_eof_packet(0, CAP),
        ]
    }

    #[test]
    fn prepare_reads_metadata() {
        let mut conn = connected(&[&prepare_reply(7)]);
        let stmt = conn.prepare("SELECT ? + LENGTH(?)").unwrap();

        assert_eq!(stmt.id(), 7);
        assert_eq!(stmt.param_num(), 2);
        assert_eq!(stmt.column_num(), 1);
        assert_eq!(stmt.param_fields().len(), 2);
        assert_eq!(stmt.column_fields()[0].name, "n");
    }

    #[test]
    fn execute_encodes_params() {
        let rs = Resultset::from_binary_rows(&["n"], &[vec![Value::from(4_i64)]]).unwrap();
        let execute = vec![
            vec![1],
            rs.fields[0].dump(),
            dump_eof_packet(0, CAP),
            rs.row_data[0].clone(),
            dump_eof_packet(0, CAP),
        ];
        let mut conn = connected(&[&prepare_reply(7), &execute]);
        let before = sent(&conn).len();

        let mut stmt = conn.prepare("SELECT ? + LENGTH(?)").unwrap();
        let result = stmt.execute(&[Value::from(1_u64), Value::Null]).unwrap();
        let mut resultset = result.resultset.unwrap();
        assert!(resultset.is_binary());
        assert_eq!(resultset.value(0, 0).unwrap(), Some(&Value::Signed(4)));

        let out = &sent(&conn)[before..];
        // skip the prepare packet
        let prepare_len = 4 + 1 + "SELECT ? + LENGTH(?)".len();
        let execute = &out[prepare_len + 4..];
        assert_eq!(execute[0], COM_STMT_EXECUTE);
        assert_eq!(&execute[1..5], &7u32.to_le_bytes());
        assert_eq!(execute[5], 0);
        assert_eq!(&execute[6..10], &1u32.to_le_bytes());
        // second param is NULL
        assert_eq!(execute[10], 0b10);
        assert_eq!(execute[11], 1);
        assert_eq!(&execute[12..14], &[MYSQL_TYPE_LONGLONG, PARAM_UNSIGNED]);
        assert_eq!(&execute[16..24], &1u64.to_le_bytes());
    }

    #[test]
    fn wrong_arity_sends_nothing() {
        let mut conn = connected(&[&prepare_reply(1)]);
        let mut stmt = conn.prepare("SELECT ? + LENGTH(?)").unwrap();

        let err = stmt.execute(&[Value::from(1_i64)]).unwrap_err();
        assert!(matches!(err, Error::Application(_)));
        drop(stmt);
        assert_eq!(conn.state(), crate::client::ConnState::Ready);
    }

    #[test]
    fn execute_with_closes_even_on_error() {
        let mut conn = connected(&[&prepare_reply(3), &[err(1105, "boom")]]);
        let before = sent(&conn).len();

        let res = conn.execute_with("SELECT ? + LENGTH(?)", &[Value::from(1_i64), Value::from("x")]);
        assert!(matches!(res, Err(Error::Server(ref e)) if e.code == 1105));

        let out = &sent(&conn)[before..];
        let close = &out[out.len() - 9..];
        assert_eq!(&close[..4], &[5, 0, 0, 0]);
        assert_eq!(close[4], COM_STMT_CLOSE);
        assert_eq!(&close[5..], &3u32.to_le_bytes());
    }

    #[test]
    fn reset_and_long_data() {
        let mut conn = connected(&[&prepare_reply(9), &[ok(0)]]);
        let mut stmt = conn.prepare("SELECT ? + LENGTH(?)").unwrap();

        stmt.send_long_data(1, b"chunk").unwrap();
        stmt.reset().unwrap();
        stmt.close().unwrap();
    }
}
