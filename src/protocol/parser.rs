//! Request Parser
//!
//! Requests are arrays of bulk strings:
//!
//! ```text
//! *<N>\r\n  $<L1>\r\n<L1 bytes>\r\n  ...  $<LN>\r\n<LN bytes>\r\n
//! ```
//!
//! [`CommandParser`] is an explicit state machine with three working states:
//!
//! ```text
//!   ┌──────────┐  *N   ┌──────────┐  $L   ┌───────────┐
//!   │ ArrayLen │──────>│ BulkLen  │──────>│ BulkData  │──┐
//!   └──────────┘       └──────────┘       └───────────┘  │
//!        ▲                  ▲   more tokens     │        │ N-th token
//!        │                  └───────────────────┘        │
//!        └────────────── resolve verb, emit ─────────────┘
//! ```
//!
//! The parser is incremental. Each call to [`CommandParser::parse`] consumes
//! the complete lines sitting in the buffer, remembers where it stopped, and
//! returns `Ok(None)` when it needs more bytes. Callers append whatever the
//! transport hands them, in any chunk size, and call `parse` again.
//!
//! Errors leave the parser reset to `ArrayLen`; the caller is expected to drop
//! the connection since the byte stream can no longer be trusted.

use crate::protocol::command::{Command, CommandKind};
use crate::protocol::types::{prefix, CRLF};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::TryReserveError;
use thiserror::Error;

/// Default capacity for a single bulk argument (64 KB).
pub const DEFAULT_MAX_BULK_LEN: usize = 64 * 1024;

/// Longest header line (`*<N>` or `$<L>`) accepted before its CRLF arrives.
const MAX_HEADER_LEN: usize = 32;

/// Argument slots reserved up front, whatever count the client declares.
const MAX_PREALLOC_ARGS: usize = 16;

/// How a parse failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The client sent bytes that do not form a valid request.
    Malformed,
    /// Memory for the request could not be reserved.
    Exhausted,
}

/// Errors that can occur during request parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected '{expected}', got {found:?}")]
    UnexpectedMarker { expected: char, found: Option<char> },

    #[error("invalid length: {0:?}")]
    InvalidLength(String),

    #[error("command array must not be empty")]
    EmptyCommand,

    #[error("header line exceeds {max} bytes")]
    HeaderTooLong { max: usize },

    #[error("bulk length {size} exceeds capacity {max}")]
    BulkTooLarge { size: usize, max: usize },

    #[error("bulk data does not match declared length {declared}")]
    LengthMismatch { declared: usize },

    #[error("out of memory: {0}")]
    Exhausted(#[from] TryReserveError),
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::Exhausted(_) => ParseErrorKind::Exhausted,
            _ => ParseErrorKind::Malformed,
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A complete, well-formed request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// The verb is known.
    Command(Command),
    /// The frame was valid but names a verb this server does not implement.
    Unsupported(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for `*<N>\r\n`.
    ArrayLen,
    /// Waiting for `$<L>\r\n`.
    BulkLen,
    /// Waiting for `L` bytes and their CRLF. `scanned` bytes at the front
    /// are already known to hold no CRLF.
    BulkData { len: usize, scanned: usize },
}

/// Incremental request parser. One per connection.
#[derive(Debug)]
pub struct CommandParser {
    state: State,
    /// Tokens still to read for the current frame.
    remaining: usize,
    verb: Option<Bytes>,
    args: Vec<Bytes>,
    max_bulk_len: usize,
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandParser {
    pub fn new() -> Self {
        Self::with_max_bulk_len(DEFAULT_MAX_BULK_LEN)
    }

    /// Creates a parser that rejects bulk arguments longer than `max_bulk_len`.
    ///
    /// The limit is capped so that a bulk plus its CRLF still fits in `usize`.
    pub fn with_max_bulk_len(max_bulk_len: usize) -> Self {
        Self {
            state: State::ArrayLen,
            remaining: 0,
            verb: None,
            args: Vec::new(),
            max_bulk_len: max_bulk_len.min(usize::MAX - CRLF.len()),
        }
    }

    /// Advances the state machine over the bytes in `buf`.
    ///
    /// Consumed bytes are removed from the front of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(parsed))` - A complete frame was read
    /// - `Ok(None)` - Need more bytes; state is kept for the next call
    /// - `Err(e)` - The stream is malformed or memory ran out
    pub fn parse(&mut self, buf: &mut BytesMut) -> ParseResult<Option<Parsed>> {
        let result = self.step(buf);
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Returns true if part of a frame has been consumed.
    pub fn is_mid_frame(&self) -> bool {
        self.state != State::ArrayLen
    }

    fn reset(&mut self) {
        self.state = State::ArrayLen;
        self.remaining = 0;
        self.verb = None;
        self.args = Vec::new();
    }

    fn step(&mut self, buf: &mut BytesMut) -> ParseResult<Option<Parsed>> {
        loop {
            match self.state {
                State::ArrayLen => {
                    let Some(line) = take_header(buf)? else {
                        return Ok(None);
                    };
                    let count = parse_header(&line, prefix::ARRAY)?;
                    if count == 0 {
                        return Err(ParseError::EmptyCommand);
                    }
                    self.remaining = count;
                    self.verb = None;
                    self.args = Vec::new();
                    self.args
                        .try_reserve_exact((count - 1).min(MAX_PREALLOC_ARGS))?;
                    self.state = State::BulkLen;
                }
                State::BulkLen => {
                    let Some(line) = take_header(buf)? else {
                        return Ok(None);
                    };
                    let len = parse_header(&line, prefix::BULK_STRING)?;
                    if len > self.max_bulk_len {
                        return Err(ParseError::BulkTooLarge {
                            size: len,
                            max: self.max_bulk_len,
                        });
                    }
                    self.state = State::BulkData { len, scanned: 0 };
                }
                State::BulkData { len, mut scanned } => {
                    let Some(token) = take_data(buf, len, &mut scanned)? else {
                        self.state = State::BulkData { len, scanned };
                        return Ok(None);
                    };
                    if self.verb.is_none() {
                        self.verb = Some(token);
                    } else {
                        self.args.try_reserve(1)?;
                        self.args.push(token);
                    }
                    self.remaining -= 1;

                    if self.remaining == 0 {
                        self.state = State::ArrayLen;
                        return Ok(Some(self.finish()));
                    }
                    self.state = State::BulkLen;
                }
            }
        }
    }

    fn finish(&mut self) -> Parsed {
        let verb = self.verb.take().unwrap_or_default();
        let args = std::mem::take(&mut self.args);
        match CommandKind::lookup(&verb) {
            Some(kind) => Parsed::Command(Command::new(kind, args)),
            None => Parsed::Unsupported(verb),
        }
    }
}

/// Splits off one header line, without its CRLF.
fn take_header(buf: &mut BytesMut) -> ParseResult<Option<BytesMut>> {
    let window = buf.len().min(MAX_HEADER_LEN + CRLF.len());
    match find_crlf(&buf[..window]) {
        Some(pos) => {
            let line = buf.split_to(pos);
            buf.advance(CRLF.len());
            Ok(Some(line))
        }
        None if window == MAX_HEADER_LEN + CRLF.len() => {
            Err(ParseError::HeaderTooLong {
                max: MAX_HEADER_LEN,
            })
        }
        None => Ok(None),
    }
}

/// Parses `<marker><digits>` into a non-negative count.
fn parse_header(line: &[u8], marker: u8) -> ParseResult<usize> {
    match line.first() {
        Some(&b) if b == marker => {}
        found => {
            return Err(ParseError::UnexpectedMarker {
                expected: marker as char,
                found: found.map(|&b| b as char),
            })
        }
    }

    let digits = &line[1..];
    let invalid = || ParseError::InvalidLength(String::from_utf8_lossy(digits).into_owned());
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)
}

/// Takes `len` data bytes once their CRLF is buffered.
///
/// The first CRLF in the data must sit exactly at `len`. One that shows up
/// earlier, or any other two bytes at `len`, means the declared length lies.
///
/// `scanned` carries over between calls while `buf` only grows, so each byte
/// is searched once. `len + CRLF.len()` cannot overflow because the parser
/// caps its bulk limit.
fn take_data(buf: &mut BytesMut, len: usize, scanned: &mut usize) -> ParseResult<Option<Bytes>> {
    let end = len + CRLF.len();
    let window = buf.len().min(end);
    let found = find_crlf(&buf[*scanned..window]).map(|pos| pos + *scanned);
    match found {
        Some(pos) if pos == len => {
            let data = Bytes::copy_from_slice(&buf[..len]);
            buf.advance(end);
            Ok(Some(data))
        }
        Some(_) => Err(ParseError::LengthMismatch { declared: len }),
        None if window == end => Err(ParseError::LengthMismatch { declared: len }),
        None => {
            // A CR in the last byte may still pair with the next read.
            *scanned = window.saturating_sub(1);
            Ok(None)
        }
    }
}

/// Finds the position of the first CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> ParseResult<Option<Parsed>> {
        let mut buf = BytesMut::from(input);
        CommandParser::new().parse(&mut buf)
    }

    fn command(kind: CommandKind, args: &[&str]) -> Parsed {
        Parsed::Command(Command::new(
            kind,
            args.iter().map(|a| Bytes::from(a.to_string())).collect(),
        ))
    }

    #[test]
    fn test_parse_ping() {
        let result = parse_all(b"*1\r\n$4\r\nPING\r\n").unwrap().unwrap();
        assert_eq!(result, command(CommandKind::Ping, &[]));
    }

    #[test]
    fn test_parse_set_with_px() {
        let input = b"*5\r\n$3\r\nset\r\n$3\r\nkey\r\n$5\r\nvalue\r\n$2\r\nPX\r\n$3\r\n100\r\n";
        let result = parse_all(input).unwrap().unwrap();
        assert_eq!(
            result,
            command(CommandKind::Set, &["key", "value", "PX", "100"])
        );
    }

    #[test]
    fn test_consumes_exactly_one_frame() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"[..]);
        let mut parser = CommandParser::new();

        assert_eq!(
            parser.parse(&mut buf).unwrap(),
            Some(command(CommandKind::Ping, &[]))
        );
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert_eq!(
            parser.parse(&mut buf).unwrap(),
            Some(command(CommandKind::Get, &["k"]))
        );
        assert!(buf.is_empty());
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n";
        let mut parser = CommandParser::new();
        let mut buf = BytesMut::new();

        for (i, byte) in input.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let result = parser.parse(&mut buf).unwrap();
            if i + 1 < input.len() {
                assert_eq!(result, None, "frame completed early at byte {}", i);
            } else {
                assert_eq!(result, Some(command(CommandKind::Set, &["name", "Ariz"])));
            }
        }
        assert!(!parser.is_mid_frame());
    }

    #[test]
    fn test_empty_and_binary_arguments() {
        let result = parse_all(b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(result, command(CommandKind::Echo, &[""]));

        let result = parse_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhe\x00\rx\r\n").unwrap().unwrap();
        assert_eq!(
            result,
            Parsed::Command(Command::new(
                CommandKind::Echo,
                vec![Bytes::from(&b"he\x00\rx"[..])]
            ))
        );
    }

    #[test]
    fn test_unsupported_command() {
        let result = parse_all(b"*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n").unwrap().unwrap();
        assert_eq!(result, Parsed::Unsupported(Bytes::from("DEL")));
    }

    #[test]
    fn test_empty_array_is_invalid() {
        assert_eq!(parse_all(b"*0\r\n"), Err(ParseError::EmptyCommand));
    }

    #[test]
    fn test_wrong_markers() {
        assert_eq!(
            parse_all(b"$4\r\nPING\r\n"),
            Err(ParseError::UnexpectedMarker {
                expected: '*',
                found: Some('$')
            })
        );
        assert_eq!(
            parse_all(b"*1\r\n:4\r\n"),
            Err(ParseError::UnexpectedMarker {
                expected: '$',
                found: Some(':')
            })
        );
        assert_eq!(
            parse_all(b"\r\n"),
            Err(ParseError::UnexpectedMarker {
                expected: '*',
                found: None
            })
        );
    }

    #[test]
    fn test_invalid_lengths() {
        let inputs: [&[u8]; 6] = [
            b"*-1\r\n",
            b"*abc\r\n",
            b"*\r\n",
            b"*+2\r\n",
            b"*1\r\n$-1\r\n",
            b"*1\r\n$99999999999999999999999\r\n",
        ];
        for input in inputs {
            assert!(
                matches!(parse_all(input), Err(ParseError::InvalidLength(_))),
                "input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_bulk_over_capacity() {
        let mut parser = CommandParser::with_max_bulk_len(8);
        let mut buf = BytesMut::from(&b"*1\r\n$9\r\n"[..]);
        assert_eq!(
            parser.parse(&mut buf),
            Err(ParseError::BulkTooLarge { size: 9, max: 8 })
        );
    }

    #[test]
    fn test_header_without_crlf_is_bounded() {
        let mut buf = BytesMut::from(&b"*"[..]);
        buf.extend_from_slice(&[b'1'; MAX_HEADER_LEN + 1]);
        assert_eq!(
            CommandParser::new().parse(&mut buf),
            Err(ParseError::HeaderTooLong {
                max: MAX_HEADER_LEN
            })
        );
    }

    #[test]
    fn test_short_data_does_not_hang() {
        // Declared 5 bytes, sent 2 before the delimiter.
        assert_eq!(
            parse_all(b"*2\r\n$4\r\nECHO\r\n$5\r\nhi\r\n"),
            Err(ParseError::LengthMismatch { declared: 5 })
        );
    }

    #[test]
    fn test_long_data_is_rejected() {
        assert_eq!(
            parse_all(b"*2\r\n$4\r\nECHO\r\n$2\r\nhello\r\n"),
            Err(ParseError::LengthMismatch { declared: 2 })
        );
    }

    #[test]
    fn test_partial_data_waits() {
        let mut parser = CommandParser::new();
        let mut buf = BytesMut::from(&b"*2\r\n$4\r\nECHO\r\n$5\r\nhel"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert!(parser.is_mid_frame());

        buf.extend_from_slice(b"lo\r");
        assert_eq!(parser.parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\n");
        assert_eq!(
            parser.parse(&mut buf).unwrap(),
            Some(command(CommandKind::Echo, &["hello"]))
        );
    }

    #[test]
    fn test_partial_data_is_scanned_once() {
        let mut parser = CommandParser::new();
        let mut buf = BytesMut::from(&b"*2\r\n$4\r\nECHO\r\n$5\r\nhel"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert_eq!(parser.state, State::BulkData { len: 5, scanned: 2 });

        buf.extend_from_slice(b"lo");
        assert_eq!(parser.parse(&mut buf).unwrap(), None);
        assert_eq!(parser.state, State::BulkData { len: 5, scanned: 4 });
    }

    #[test]
    fn test_early_crlf_split_across_reads() {
        let mut parser = CommandParser::new();
        let mut buf = BytesMut::from(&b"*2\r\n$4\r\nECHO\r\n$5\r\nab\r"[..]);
        assert_eq!(parser.parse(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\ncd\r\n");
        assert_eq!(
            parser.parse(&mut buf),
            Err(ParseError::LengthMismatch { declared: 5 })
        );
    }

    #[test]
    fn test_large_bulk_in_small_chunks() {
        let value = vec![b'x'; 4096];
        let mut frame = b"*2\r\n$4\r\nECHO\r\n$4096\r\n".to_vec();
        frame.extend_from_slice(&value);
        frame.extend_from_slice(b"\r\n");

        let mut parser = CommandParser::new();
        let mut buf = BytesMut::new();
        let mut result = None;
        for chunk in frame.chunks(7) {
            buf.extend_from_slice(chunk);
            if let Some(parsed) = parser.parse(&mut buf).unwrap() {
                result = Some(parsed);
            }
        }
        assert_eq!(
            result,
            Some(Parsed::Command(Command::new(
                CommandKind::Echo,
                vec![Bytes::from(value)]
            )))
        );
        assert!(buf.is_empty());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_unbounded_limit_does_not_overflow() {
        let mut parser = CommandParser::with_max_bulk_len(usize::MAX);
        let mut buf = BytesMut::from(&b"*1\r\n$18446744073709551615\r\nPING\r\n"[..]);
        assert_eq!(
            parser.parse(&mut buf),
            Err(ParseError::BulkTooLarge {
                size: usize::MAX,
                max: usize::MAX - CRLF.len(),
            })
        );

        let mut buf = BytesMut::from(&b"*1\r\n$18446744073709551613\r\nPING\r\n"[..]);
        assert_eq!(
            parser.parse(&mut buf),
            Err(ParseError::LengthMismatch {
                declared: usize::MAX - CRLF.len(),
            })
        );
    }

    #[test]
    fn test_error_resets_parser() {
        let mut parser = CommandParser::new();
        let mut buf = BytesMut::from(&b"*1\r\n#\r\n"[..]);
        assert!(parser.parse(&mut buf).is_err());
        assert!(!parser.is_mid_frame());

        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nping\r\n"[..]);
        assert_eq!(
            parser.parse(&mut buf).unwrap(),
            Some(command(CommandKind::Ping, &[]))
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ParseError::EmptyCommand.kind(), ParseErrorKind::Malformed);
        assert_eq!(
            ParseError::LengthMismatch { declared: 1 }.kind(),
            ParseErrorKind::Malformed
        );

        let exhausted = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        assert_eq!(
            ParseError::from(exhausted).kind(),
            ParseErrorKind::Exhausted
        );
    }
}
