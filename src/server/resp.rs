use std::io::{Read, Write};

use log::trace;

use crate::{
    error::{Error, HandlerError},
    protocol::{
        Field, MyError, PacketTransport, QueryResult, Resultset,
        codec::PacketWriter,
        consts::{OK_HEADER, error_code::ER_UNKNOWN_ERROR},
        response::{dump_eof_packet, dump_err_packet, dump_ok_packet},
    },
};

/// Passes a [`MyError`] through unchanged and wraps anything else as `ER_UNKNOWN_ERROR`.
pub(crate) fn into_my_error(err: HandlerError) -> MyError {
    match err.downcast::<MyError>() {
        Ok(err) => *err,
        Err(err) => MyError::new(ER_UNKNOWN_ERROR, err.to_string()),
    }
}

/// Everything a command cycle can answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok(Option<QueryResult>),
    Error(MyError),
    Resultset(Resultset),
    FieldList(Vec<Field>),
    Prepared { id: u32, params: u16, columns: u16 },
    /// QUIT, STMT_CLOSE and STMT_SEND_LONG_DATA expect no reply.
    None,
}

impl Response {
    pub fn from_result(result: QueryResult) -> Self {
        match result.resultset {
            Some(resultset) => Response::Resultset(resultset),
            None => Response::Ok(Some(result)),
        }
    }

    pub fn from_error(err: HandlerError) -> Self {
        Response::Error(into_my_error(err))
    }

    pub fn write<S: Read + Write>(
        self,
        transport: &mut PacketTransport<S>,
        capability: u32,
        status: u16,
    ) -> Result<(), Error> {
        match self {
            Response::Ok(result) => {
                let mut result = result.unwrap_or_default();
                result.status |= status;
                transport.write_packet(&dump_ok_packet(&result, capability))
            }
            Response::Error(err) => {
                trace!("sending error {err}");
                transport.write_packet(&dump_err_packet(&err, capability))
            }
            Response::Resultset(resultset) => {
                let mut count = PacketWriter::new();
                count.write_lenenc_int(resultset.fields.len() as u64);
                transport.write_packet(count.as_bytes())?;

                for field in &resultset.fields {
                    transport.write_packet(&field.dump())?;
                }
                transport.write_packet(&dump_eof_packet(status, capability))?;

                for row in &resultset.row_data {
                    transport.write_packet(row)?;
                }
                transport.write_packet(&dump_eof_packet(status, capability))
            }
            Response::FieldList(fields) => {
                for field in &fields {
                    transport.write_packet(&field.dump())?;
                }
                transport.write_packet(&dump_eof_packet(status, capability))
            }
            Response::Prepared {
                id,
                params,
                columns,
            } => {
                let mut ok = PacketWriter::with_capacity(12);
                ok.write_u8(OK_HEADER);
                ok.write_u32(id);
                ok.write_u16(columns);
                ok.write_u16(params);
                ok.write_u8(0);
                ok.write_u16(0);
                transport.write_packet(ok.as_bytes())?;

                // the client only counts these, their content is not meaningful
                let placeholder = Field::default().dump();
                for count in [params, columns] {
                    if count > 0 {
                        for _ in 0..count {
                            transport.write_packet(&placeholder)?;
                        }
                        transport.write_packet(&dump_eof_packet(status, capability))?;
                    }
                }
                Ok(())
            }
            Response::None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_errors_map_to_server_errors() {
        let err: HandlerError = Box::new(MyError::new(1146, "Table 't' doesn't exist"));
        assert_eq!(
            Response::from_error(err),
            Response::Error(MyError::new(1146, "Table 't' doesn't exist"))
        );

        match Response::from_error("boom".into()) {
            Response::Error(err) => {
                assert_eq!(err.code, ER_UNKNOWN_ERROR);
                assert_eq!(err.message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn results_without_rows_are_ok() {
        assert_eq!(
            Response::from_result(QueryResult::ok(3, 9)),
            Response::Ok(Some(QueryResult::ok(3, 9)))
        );
        let rs = Resultset::new(false);
        assert_eq!(
            Response::from_result(QueryResult::with_resultset(rs.clone())),
            Response::Resultset(rs)
        );
    }
}
