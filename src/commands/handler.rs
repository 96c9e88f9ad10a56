//! Command Handler
//!
//! Maps a parsed [`Command`] to a store operation and a reply.
//!
//! ## Supported Commands
//!
//! - `PING` - `+PONG`
//! - `ECHO message` - the message as a bulk string
//! - `GET key` - the value, or nil if missing or expired
//! - `SET key value [PX milliseconds]` - `+OK`
//!
//! Argument errors are replied to as RESP errors and never touch the store.
//! Unknown verbs get a status reply naming the verb, and the connection stays
//! open.

use crate::protocol::{Command, CommandKind, Parsed, RespValue};
use crate::storage::Store;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Executes commands against the shared store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<Store>,
}

impl CommandHandler {
    pub fn new(storage: Arc<Store>) -> Self {
        Self { storage }
    }

    /// Replies to a parsed frame, whether or not its verb is known.
    pub fn handle(&self, parsed: Parsed) -> RespValue {
        match parsed {
            Parsed::Command(command) => self.execute(command),
            Parsed::Unsupported(name) => unsupported(&name),
        }
    }

    /// Executes a command and returns the response.
    pub fn execute(&self, command: Command) -> RespValue {
        let Command { kind, args } = command;
        match kind {
            CommandKind::Ping => self.cmd_ping(&args),
            CommandKind::Echo => self.cmd_echo(args),
            CommandKind::Get => self.cmd_get(&args),
            CommandKind::Set => self.cmd_set(args),
        }
    }

    /// PING
    fn cmd_ping(&self, args: &[Bytes]) -> RespValue {
        if !args.is_empty() {
            return wrong_arity(CommandKind::Ping);
        }
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, args: Vec<Bytes>) -> RespValue {
        match <[Bytes; 1]>::try_from(args) {
            Ok([message]) => RespValue::bulk_string(message),
            Err(_) => wrong_arity(CommandKind::Echo),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let [key] = args else {
            return wrong_arity(CommandKind::Get);
        };

        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: Vec<Bytes>) -> RespValue {
        let mut args = args.into_iter();
        let (Some(key), Some(value)) = (args.next(), args.next()) else {
            return wrong_arity(CommandKind::Set);
        };

        let ttl = match (args.next(), args.next(), args.next()) {
            (None, _, _) => None,
            (Some(option), millis, None) => {
                if !option.eq_ignore_ascii_case(b"px") {
                    return RespValue::error("ERR syntax error");
                }
                let Some(millis) = millis else {
                    return RespValue::error("ERR syntax error, PX requires a value");
                };
                match parse_millis(&millis) {
                    Ok(ttl) => Some(ttl),
                    Err(reply) => return reply,
                }
            }
            (Some(_), _, Some(_)) => return wrong_arity(CommandKind::Set),
        };

        self.storage.set(key, value, ttl);
        RespValue::ok()
    }
}

/// Advisory for unknown verbs. Sent as a status reply, not an error reply.
fn unsupported(name: &[u8]) -> RespValue {
    let name: String = String::from_utf8_lossy(name)
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    RespValue::simple_string(format!("unsupported command '{}'", name))
}

fn wrong_arity(kind: CommandKind) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        kind
    ))
}

/// Parses a base-10 millisecond count into a TTL.
fn parse_millis(raw: &[u8]) -> Result<Duration, RespValue> {
    let millis: i64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RespValue::error("ERR value is not an integer or out of range"))?;

    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| RespValue::error("ERR invalid expire time in 'set' command"))
}
