//! RESP Protocol Implementation
//!
//! ## Modules
//!
//! - `types`: The `RespValue` reply type and its wire encoding
//! - `command`: `Command` and the case-insensitive verb table
//! - `parser`: Incremental state-machine parser for request frames
//!
//! ## Example
//!
//! ```
//! use sparkkv::protocol::{CommandKind, CommandParser, Parsed, RespValue};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let parsed = CommandParser::new().parse(&mut buf).unwrap().unwrap();
//! match parsed {
//!     Parsed::Command(cmd) => assert_eq!(cmd.kind, CommandKind::Get),
//!     Parsed::Unsupported(_) => unreachable!(),
//! }
//!
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize().unwrap(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::{Command, CommandKind};
pub use parser::{CommandParser, ParseError, ParseErrorKind, ParseResult, Parsed};
pub use types::{EncodeError, RespValue};
