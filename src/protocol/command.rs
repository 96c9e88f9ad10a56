//! Parsed Commands
//!
//! A request frame becomes a [`Command`]: the verb resolved to a
//! [`CommandKind`] and the remaining tokens as owned arguments.

use bytes::Bytes;
use std::fmt;

/// The verbs this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Ping,
    Echo,
    Get,
    Set,
}

/// Lower-cased verb name to kind.
const COMMAND_TABLE: &[(&str, CommandKind)] = &[
    ("ping", CommandKind::Ping),
    ("echo", CommandKind::Echo),
    ("get", CommandKind::Get),
    ("set", CommandKind::Set),
];

impl CommandKind {
    /// Resolves a verb token, ignoring ASCII case.
    ///
    /// ```
    /// use sparkkv::protocol::CommandKind;
    /// assert_eq!(CommandKind::lookup(b"gEt"), Some(CommandKind::Get));
    /// assert_eq!(CommandKind::lookup(b"DEL"), None);
    /// ```
    pub fn lookup(name: &[u8]) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(known, _)| known.as_bytes().eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    /// The lower-case name used in error replies.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Ping => "ping",
            CommandKind::Echo => "echo",
            CommandKind::Get => "get",
            CommandKind::Set => "set",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request ready for dispatch. `args` never includes the verb itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<Bytes>,
}

impl Command {
    pub fn new(kind: CommandKind, args: Vec<Bytes>) -> Self {
        Self { kind, args }
    }
}
