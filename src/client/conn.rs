#[cfg(unix)]
use std::{os::unix::net::UnixStream, path::Path};
use std::{
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    auth,
    error::{Error, ProtocolError},
    protocol::{
        Field, PacketTransport, QueryResult, ResultDecoder, Value,
        codec::{PacketReader, PacketWriter},
        consts::{
            DEFAULT_CHARSET, DEFAULT_COLLATION_ID, ERR_HEADER, MAX_PAYLOAD_LEN,
            MIN_PROTOCOL_VERSION,
            capability::{
                CLIENT_CONNECT_WITH_DB, CLIENT_PROTOCOL_41, CLIENT_SECURE_CONNECTION,
                DEFAULT_CLIENT_FLAGS,
            },
            command::{COM_FIELD_LIST, COM_INIT_DB, COM_PING, COM_QUERY, COM_QUIT},
            status::{SERVER_STATUS_AUTOCOMMIT, SERVER_STATUS_IN_TRANS},
        },
    },
};

use super::Stmt;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Handshaking,
    Ready,
    Executing,
    Closed,
}

/// A client session over one connection.
///
/// A session serves a single caller; commands are strictly request/response.
pub struct Conn<S: Read + Write> {
    transport: Option<PacketTransport<S>>,
    state: ConnState,
    decoder: ResultDecoder,
    user: String,
    password: String,
    db: String,
    charset: String,
    salt: Vec<u8>,
    connection_id: u32,
    server_version: String,
}

impl Conn<TcpStream> {
    /// Connects over TCP and authenticates.
    pub fn connect(addr: &str, user: &str, password: &str, db: &str) -> Result<Self, Error> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, addr.to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_nodelay(true)?;
        info!("connected to {addr}");

        Conn::handshake(stream, user, password, db)
    }
}

#[cfg(unix)]
impl Conn<UnixStream> {
    /// Connects over a unix domain socket, such as `/var/run/mysqld/mysqld.sock`,
    /// and authenticates.
    pub fn connect_unix(
        path: impl AsRef<Path>,
        user: &str,
        password: &str,
        db: &str,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)?;
        info!("connected to {}", path.display());

        Conn::handshake(stream, user, password, db)
    }
}

impl<S: Read + Write> Conn<S> {
    /// Runs the handshake over an already established stream.
    pub fn handshake(stream: S, user: &str, password: &str, db: &str) -> Result<Self, Error> {
        let mut conn = Self {
            transport: Some(PacketTransport::new(stream)),
            state: ConnState::Disconnected,
            decoder: ResultDecoder::default(),
            user: user.to_string(),
            password: password.to_string(),
            db: db.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            salt: Vec::new(),
            connection_id: 0,
            server_version: String::new(),
        };

        conn.state = ConnState::Handshaking;
        if let Err(e) = conn.authenticate() {
            conn.close();
            return Err(Error::Handshake(Box::new(e)));
        }
        conn.state = ConnState::Ready;
        debug!(
            "handshake done, server {} connection id {}",
            conn.server_version, conn.connection_id
        );
        Ok(conn)
    }

    fn authenticate(&mut self) -> Result<(), Error> {
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;

        let greeting = transport.read_packet()?;
        if greeting.first() == Some(&ERR_HEADER) {
            return Err(self.decoder.handle_err_packet(&greeting));
        }
        let server_capability = self.read_initial_handshake(&greeting)?;

        let mut capability = DEFAULT_CLIENT_FLAGS & server_capability;
        if !self.db.is_empty() {
            capability |= CLIENT_CONNECT_WITH_DB & server_capability;
        }
        self.decoder = ResultDecoder::new(capability);

        let auth_packet = self.auth_packet(capability);
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;
        transport.write_packet(&auth_packet)?;
        self.decoder.read_ok(transport)?;
        Ok(())
    }

    fn read_initial_handshake(&mut self, data: &[u8]) -> Result<u32, Error> {
        let mut reader = PacketReader::new(data);

        let version = reader.read_u8()?;
        if version < MIN_PROTOCOL_VERSION {
            return Err(ProtocolError::Unsupported(format!("protocol version {version}")).into());
        }
        self.server_version = String::from_utf8_lossy(reader.read_null_terminated()).into_owned();
        self.connection_id = reader.read_u32()?;
        self.salt = reader.read_bytes(8)?.to_vec();
        reader.skip(1)?;

        let mut capability = u32::from(reader.read_u16()?);
        if !reader.is_empty() {
            // charset and status are informational here
            reader.skip(3)?;
            capability |= u32::from(reader.read_u16()?) << 16;
            let auth_len = usize::from(reader.read_u8()?);
            reader.skip(10)?;

            if capability & CLIENT_SECURE_CONNECTION != 0 {
                let len = auth_len.saturating_sub(8).max(13).min(reader.remaining());
                let part = reader.read_bytes(len)?;
                let part = part.strip_suffix(&[0]).unwrap_or(part);
                self.salt.extend_from_slice(part);
            }
        }

        if capability & CLIENT_PROTOCOL_41 == 0 {
            return Err(ProtocolError::Unsupported("pre-4.1 server".to_string()).into());
        }
        Ok(capability)
    }

    fn auth_packet(&self, capability: u32) -> Vec<u8> {
        let auth = auth::scramble_password(&self.salt, &self.password);
        let mut writer = PacketWriter::with_capacity(64 + self.user.len() + self.db.len());

        writer.write_u32(capability);
        writer.write_u32(MAX_PAYLOAD_LEN as u32);
        writer.write_u8(DEFAULT_COLLATION_ID);
        writer.write_zeros(23);
        writer.write_null_terminated(self.user.as_bytes());
        if capability & CLIENT_SECURE_CONNECTION != 0 {
            writer.write_u8(auth.len() as u8);
            writer.write_bytes(&auth);
        } else {
            writer.write_null_terminated(&auth);
        }
        if capability & CLIENT_CONNECT_WITH_DB != 0 {
            writer.write_null_terminated(self.db.as_bytes());
        }
        writer.into_bytes()
    }

    /// Runs one command cycle. Fatal errors close the session before returning.
    pub(crate) fn run<R>(
        &mut self,
        command: impl FnOnce(&mut PacketTransport<S>, &mut ResultDecoder) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if self.state != ConnState::Ready {
            return Err(Error::Closed);
        }
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;

        self.state = ConnState::Executing;
        transport.reset_sequence();
        match command(transport, &mut self.decoder) {
            Ok(r) => {
                self.state = ConnState::Ready;
                Ok(r)
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!("closing connection after fatal error: {e}");
                    self.close();
                } else {
                    self.state = ConnState::Ready;
                }
                Err(e)
            }
        }
    }

    /// Executes a text query.
    pub fn execute(&mut self, query: &str) -> Result<QueryResult, Error> {
        self.run(|transport, decoder| {
            write_command(transport, COM_QUERY, query.as_bytes())?;
            decoder.read_result(transport, false)
        })
    }

    /// Prepares, executes and closes a statement in one go. The statement is
    /// closed on the server whether or not execution succeeded.
    pub fn execute_with(&mut self, query: &str, args: &[Value]) -> Result<QueryResult, Error> {
        if args.is_empty() {
            return self.execute(query);
        }

        let mut stmt = self.prepare(query)?;
        let result = stmt.execute(args);
        if let Err(e) = stmt.close() {
            warn!("failed to close statement: {e}");
        }
        result
    }

    pub fn prepare(&mut self, query: &str) -> Result<Stmt<'_, S>, Error> {
        Stmt::prepare(self, query)
    }

    pub fn ping(&mut self) -> Result<(), Error> {
        self.run(|transport, decoder| {
            write_command(transport, COM_PING, &[])?;
            decoder.read_ok(transport)
        })
        .map(|_| ())
    }

    pub fn use_db(&mut self, db: &str) -> Result<(), Error> {
        if self.db == db {
            return Ok(());
        }
        self.run(|transport, decoder| {
            write_command(transport, COM_INIT_DB, db.as_bytes())?;
            decoder.read_ok(transport)
        })?;
        self.db = db.to_string();
        Ok(())
    }

    pub fn field_list(&mut self, table: &str, wildcard: &str) -> Result<Vec<Field>, Error> {
        let mut payload = PacketWriter::new();
        payload.write_null_terminated(table.as_bytes());
        payload.write_bytes(wildcard.as_bytes());

        self.run(|transport, decoder| {
            write_command(transport, COM_FIELD_LIST, payload.as_bytes())?;
            decoder.read_fields(transport)
        })
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        self.execute("BEGIN").map(|_| ())
    }

    pub fn commit(&mut self) -> Result<(), Error> {
        self.execute("COMMIT").map(|_| ())
    }

    pub fn rollback(&mut self) -> Result<(), Error> {
        self.execute("ROLLBACK").map(|_| ())
    }

    pub fn set_charset(&mut self, charset: &str) -> Result<(), Error> {
        if self.charset == charset {
            return Ok(());
        }
        self.execute(&format!("SET NAMES {charset}"))?;
        self.charset = charset.to_string();
        Ok(())
    }

    pub fn set_auto_commit(&mut self) -> Result<(), Error> {
        if !self.is_auto_commit() {
            self.execute("SET AUTOCOMMIT = 1")?;
        }
        Ok(())
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn capability(&self) -> u32 {
        self.decoder.capability
    }

    /// Server status flags from the most recent OK or EOF packet.
    pub fn status(&self) -> u16 {
        self.decoder.status
    }

    pub fn is_auto_commit(&self) -> bool {
        self.decoder.status & SERVER_STATUS_AUTOCOMMIT != 0
    }

    pub fn is_in_transaction(&self) -> bool {
        self.decoder.status & SERVER_STATUS_IN_TRANS != 0
    }

    /// Closes the session. Safe to call repeatedly and from any state.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if self.state == ConnState::Ready {
                transport.reset_sequence();
                // best effort, the peer may already be gone
                let _ = transport.write_packet(&[COM_QUIT]);
            }
            debug!("connection {} closed", self.connection_id);
        }
        self.state = ConnState::Closed;
    }
}

pub(crate) fn write_command<S: Read + Write>(
    transport: &mut PacketTransport<S>,
    command: u8,
    payload: &[u8],
) -> Result<(), Error> {
    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(command);
    data.extend_from_slice(payload);
    transport.write_packet(&data)
}
