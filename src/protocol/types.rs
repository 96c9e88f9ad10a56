//! RESP Reply Types
//!
//! Every reply the server sends is a [`RespValue`]. Each kind starts with a
//! marker byte and ends with CRLF:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-ERR syntax error\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n`
//! - `$-1\r\n` Nil Bulk String
//!
//! Arrays (`*`) share the marker table with requests, but no command in this
//! server replies with one, so encoding an array is refused.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Errors raised while encoding a reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Array replies are not produced by any command.
    #[error("array replies are not supported")]
    UnsupportedArray,
}

/// A reply in the RESP protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply. Must not contain CR or LF.
    /// Format: `+<string>\r\n`
    SimpleString(String),

    /// Error reply. Must not contain CR or LF.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe value.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Nil bulk string: `$-1\r\n`
    Null,

    /// Declared for completeness; encoding fails with
    /// [`EncodeError::UnsupportedArray`].
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// assert_eq!(ok.serialize().unwrap(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// let err = RespValue::error("ERR syntax error");
    /// assert_eq!(err.serialize().unwrap(), b"-ERR syntax error\r\n");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// The nil bulk string, sent for missing keys.
    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value into a fresh buffer.
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Serializes the value into an existing buffer.
    ///
    /// On error nothing is appended to `buf`.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(prefix::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(_) => return Err(EncodeError::UnsupportedArray),
        }
        Ok(())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => write!(f, "(array, {} elements)", values.len()),
        }
    }
}
