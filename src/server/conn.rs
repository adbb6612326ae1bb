use std::io::{Read, Write};

use log::{debug, info, warn};

use crate::{
    auth,
    error::{Error, ProtocolError},
    protocol::{
        MyError, PacketTransport, QueryResult,
        codec::{PacketReader, PacketWriter},
        consts::{
            AUTH_NATIVE_PASSWORD, DEFAULT_COLLATION_ID, SERVER_VERSION,
            capability::{
                CLIENT_CONNECT_WITH_DB, CLIENT_PLUGIN_AUTH, CLIENT_PROTOCOL_41,
                CLIENT_SECURE_CONNECTION, DEFAULT_SERVER_FLAGS,
            },
            error_code::ER_ACCESS_DENIED_ERROR,
            status::SERVER_STATUS_AUTOCOMMIT,
        },
        response::{dump_err_packet, dump_ok_packet},
    },
};

use super::{Handler, resp::into_my_error, stmt::StatementTable};

/// Account accepted by [`Session::accept`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Server side of one connection, answering commands through a [`Handler`].
pub struct Session<H: Handler, S: Read + Write> {
    pub(super) transport: Option<PacketTransport<S>>,
    pub(super) handler: H,
    pub(super) capability: u32,
    pub(super) status: u16,
    pub(super) stmts: StatementTable<H::Context>,
    pub(super) db: String,
    connection_id: u32,
    user: String,
}

impl<H: Handler, S: Read + Write> Session<H, S> {
    /// Wraps a stream whose client is already authenticated.
    pub fn new(stream: S, handler: H, capability: u32) -> Self {
        Self {
            transport: Some(PacketTransport::new(stream)),
            handler,
            capability,
            status: SERVER_STATUS_AUTOCOMMIT,
            stmts: StatementTable::new(),
            db: String::new(),
            connection_id: 0,
            user: String::new(),
        }
    }

    /// Runs the server half of the handshake and authenticates the client.
    pub fn accept(
        stream: S,
        handler: H,
        credentials: &Credentials,
        connection_id: u32,
    ) -> Result<Self, Error> {
        let mut session = Self::new(stream, handler, DEFAULT_SERVER_FLAGS);
        session.connection_id = connection_id;

        if let Err(e) = session.authenticate(credentials) {
            session.close();
            return Err(Error::Handshake(Box::new(e)));
        }
        info!(
            "connection {connection_id} authenticated as '{}'",
            session.user
        );
        Ok(session)
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), Error> {
        let salt = auth::generate_salt();
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;

        transport.write_packet(&greeting(self.connection_id, &salt, self.status))?;
        let data = transport.read_packet()?;
        let response = HandshakeResponse::parse(&data)?;

        self.capability = response.capability & DEFAULT_SERVER_FLAGS;
        self.user = response.user;

        if self.user != credentials.user
            || !auth::verify_password(&salt, &credentials.password, &response.auth)
        {
            let err = MyError::new(
                ER_ACCESS_DENIED_ERROR,
                format!(
                    "Access denied for user '{}' (using password: {})",
                    self.user,
                    if response.auth.is_empty() { "NO" } else { "YES" }
                ),
            );
            transport.write_packet(&dump_err_packet(&err, self.capability))?;
            return Err(err.into());
        }

        if let Some(db) = response.db.filter(|db| !db.is_empty()) {
            if let Err(e) = self.handler.use_db(&db) {
                let err = into_my_error(e);
                transport.write_packet(&dump_err_packet(&err, self.capability))?;
                return Err(err.into());
            }
            self.db = db;
        }

        let ok = QueryResult {
            status: self.status,
            ..QueryResult::default()
        };
        transport.write_packet(&dump_ok_packet(&ok, self.capability))?;
        transport.reset_sequence();
        Ok(())
    }

    /// Reads one command, answers it and resets the sequence for the next one.
    /// Read and write failures close the session.
    pub fn handle_command(&mut self) -> Result<(), Error> {
        let transport = self.transport.as_mut().ok_or(Error::Closed)?;

        let data = match transport.read_packet() {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                self.close();
                return Err(ProtocolError::MalformedPacket.into());
            }
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        let response = self.dispatch(&data);

        let Some(transport) = self.transport.as_mut() else {
            // QUIT
            return Ok(());
        };
        let result = response.write(transport, self.capability, self.status);
        transport.reset_sequence();

        if let Err(e) = result {
            warn!("connection {}: write failed: {e}", self.connection_id);
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Serves commands until the client quits or the connection fails.
    pub fn run(&mut self) -> Result<(), Error> {
        while !self.is_closed() {
            self.handle_command()?;
        }
        info!("connection {} closed", self.connection_id);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!(
                "connection {} dropped with {} open statements",
                self.connection_id,
                self.stmts.len()
            );
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn capability(&self) -> u32 {
        self.capability
    }

    /// Status flags sent with every OK and EOF packet.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }
}

fn greeting(connection_id: u32, salt: &[u8], status: u16) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(128);
    writer.write_u8(10);
    writer.write_null_terminated(SERVER_VERSION.as_bytes());
    writer.write_u32(connection_id);
    writer.write_bytes(&salt[..8]);
    writer.write_u8(0);
    writer.write_u16(DEFAULT_SERVER_FLAGS as u16);
    writer.write_u8(DEFAULT_COLLATION_ID);
    writer.write_u16(status);
    writer.write_u16((DEFAULT_SERVER_FLAGS >> 16) as u16);
    writer.write_u8(salt.len() as u8 + 1);
    writer.write_zeros(10);
    writer.write_null_terminated(&salt[8..]);
    if DEFAULT_SERVER_FLAGS & CLIENT_PLUGIN_AUTH != 0 {
        writer.write_null_terminated(AUTH_NATIVE_PASSWORD.as_bytes());
    }
    writer.into_bytes()
}

struct HandshakeResponse {
    capability: u32,
    user: String,
    auth: Vec<u8>,
    db: Option<String>,
}

impl HandshakeResponse {
    fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = PacketReader::new(data);

        let capability = reader.read_u32()?;
        if capability & CLIENT_PROTOCOL_41 == 0 {
            return Err(ProtocolError::Unsupported("pre-4.1 client".to_string()));
        }
        // max packet size, charset, reserved
        reader.skip(4 + 1 + 23)?;

        let user = String::from_utf8_lossy(reader.read_null_terminated()).into_owned();
        let auth = if capability & CLIENT_SECURE_CONNECTION != 0 {
            let len = usize::from(reader.read_u8()?);
            reader.read_bytes(len)?.to_vec()
        } else {
            reader.read_null_terminated().to_vec()
        };

        let db = if capability & CLIENT_CONNECT_WITH_DB != 0 && !reader.is_empty() {
            Some(String::from_utf8_lossy(reader.read_null_terminated()).into_owned())
        } else {
            None
        };

        Ok(Self {
            capability,
            user,
            auth,
            db,
        })
    }
}
