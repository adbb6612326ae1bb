//! Wire constants: header bytes, command codes, capability and status bits,
//! column types and the error codes this crate emits.

/// Largest payload a single physical frame can carry (2^24 - 1).
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FF_FF;

pub const MIN_PROTOCOL_VERSION: u8 = 10;
pub const SERVER_VERSION: &str = "5.7.0-mywire";
pub const AUTH_NATIVE_PASSWORD: &str = "mysql_native_password";

pub const DEFAULT_CHARSET: &str = "utf8";
pub const DEFAULT_COLLATION_ID: u8 = 33;
pub const BINARY_COLLATION_ID: u16 = 63;

pub const OK_HEADER: u8 = 0x00;
pub const ERR_HEADER: u8 = 0xFF;
pub const EOF_HEADER: u8 = 0xFE;
pub const LOCAL_INFILE_HEADER: u8 = 0xFB;

/// Marker for a NULL cell in text rows and length-encoded strings.
pub const NULL_MARKER: u8 = 0xFB;

pub mod command {
    pub const COM_QUIT: u8 = 0x01;
    pub const COM_INIT_DB: u8 = 0x02;
    pub const COM_QUERY: u8 = 0x03;
    pub const COM_FIELD_LIST: u8 = 0x04;
    pub const COM_PING: u8 = 0x0e;
    pub const COM_STMT_PREPARE: u8 = 0x16;
    pub const COM_STMT_EXECUTE: u8 = 0x17;
    pub const COM_STMT_SEND_LONG_DATA: u8 = 0x18;
    pub const COM_STMT_CLOSE: u8 = 0x19;
    pub const COM_STMT_RESET: u8 = 0x1a;
}

pub mod capability {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 13;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;

    /// Capabilities advertised by the server role.
    pub const DEFAULT_SERVER_FLAGS: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_LONG_FLAG
        | CLIENT_CONNECT_WITH_DB
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION;

    /// Capabilities requested by the client role before intersecting with the server's.
    pub const DEFAULT_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_LONG_PASSWORD
        | CLIENT_TRANSACTIONS
        | CLIENT_LONG_FLAG;
}

pub mod status {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
}

pub mod field_type {
    pub const MYSQL_TYPE_DECIMAL: u8 = 0x00;
    pub const MYSQL_TYPE_TINY: u8 = 0x01;
    pub const MYSQL_TYPE_SHORT: u8 = 0x02;
    pub const MYSQL_TYPE_LONG: u8 = 0x03;
    pub const MYSQL_TYPE_FLOAT: u8 = 0x04;
    pub const MYSQL_TYPE_DOUBLE: u8 = 0x05;
    pub const MYSQL_TYPE_NULL: u8 = 0x06;
    pub const MYSQL_TYPE_TIMESTAMP: u8 = 0x07;
    pub const MYSQL_TYPE_LONGLONG: u8 = 0x08;
    pub const MYSQL_TYPE_INT24: u8 = 0x09;
    pub const MYSQL_TYPE_DATE: u8 = 0x0a;
    pub const MYSQL_TYPE_TIME: u8 = 0x0b;
    pub const MYSQL_TYPE_DATETIME: u8 = 0x0c;
    pub const MYSQL_TYPE_YEAR: u8 = 0x0d;
    pub const MYSQL_TYPE_NEWDATE: u8 = 0x0e;
    pub const MYSQL_TYPE_VARCHAR: u8 = 0x0f;
    pub const MYSQL_TYPE_BIT: u8 = 0x10;
    pub const MYSQL_TYPE_JSON: u8 = 0xf5;
    pub const MYSQL_TYPE_NEWDECIMAL: u8 = 0xf6;
    pub const MYSQL_TYPE_ENUM: u8 = 0xf7;
    pub const MYSQL_TYPE_SET: u8 = 0xf8;
    pub const MYSQL_TYPE_TINY_BLOB: u8 = 0xf9;
    pub const MYSQL_TYPE_MEDIUM_BLOB: u8 = 0xfa;
    pub const MYSQL_TYPE_LONG_BLOB: u8 = 0xfb;
    pub const MYSQL_TYPE_BLOB: u8 = 0xfc;
    pub const MYSQL_TYPE_VAR_STRING: u8 = 0xfd;
    pub const MYSQL_TYPE_STRING: u8 = 0xfe;
    pub const MYSQL_TYPE_GEOMETRY: u8 = 0xff;
}

pub mod field_flag {
    pub const NOT_NULL_FLAG: u16 = 0x0001;
    pub const BINARY_FLAG: u16 = 0x0080;
    pub const UNSIGNED_FLAG: u16 = 0x0020;
}

pub mod error_code {
    pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
    pub const ER_UNKNOWN_COM_ERROR: u16 = 1047;
    pub const ER_UNKNOWN_ERROR: u16 = 1105;
    pub const ER_UNKNOWN_STMT_HANDLER: u16 = 1243;
    pub const ER_MAX_PREPARED_STMT_COUNT_REACHED: u16 = 1461;
    pub const ER_MALFORMED_PACKET: u16 = 1835;
}
