//! Connection Session
//!
//! One session per client connection. It runs until the client goes away or
//! a fatal error occurs.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. Session spawned on a runtime worker
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  Read until a frame parses   │◄──┐
//!    │  Dispatch to CommandHandler  │   │
//!    │  Encode + flush the reply    │───┘
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. End of stream: exit quietly
//!    Malformed frame / out of memory: best-effort `-ERR`, then exit
//!    Write failure: exit
//! ```
//!
//! Commands on one connection are handled strictly in arrival order; the next
//! frame is not parsed until the previous reply has been flushed.

use crate::commands::CommandHandler;
use crate::protocol::{CommandParser, EncodeError, ParseError, ParseErrorKind, Parsed, RespValue};
use bytes::BytesMut;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// I/O error other than the peer going away
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The request stream could not be parsed
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// A reply could not be encoded
    #[error("Encode error: {0}")]
    EncodeError(#[from] EncodeError),
}

impl SessionError {
    /// The reply to attempt before closing, if the connection is still usable.
    pub fn error_reply(&self) -> Option<RespValue> {
        match self {
            SessionError::IoError(_) => None,
            SessionError::ParseError(e) => match e.kind() {
                ParseErrorKind::Malformed => {
                    Some(RespValue::error(format!("ERR protocol error: {}", e)))
                }
                ParseErrorKind::Exhausted => Some(RespValue::error("ERR out of memory")),
            },
            SessionError::EncodeError(_) => Some(RespValue::error("ERR internal error")),
        }
    }
}

/// Drives the read-parse-dispatch-write loop for one connection.
///
/// Generic over the stream so it can run on a `TcpStream` or any in-memory
/// transport.
pub struct Session<S> {
    /// The client stream, write-buffered
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Bytes read but not yet parsed
    buffer: BytesMut,

    /// Reply scratch space, reused between commands
    out: Vec<u8>,

    command_handler: CommandHandler,

    parser: CommandParser,

    stats: Arc<ConnectionStats>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            out: Vec::new(),
            command_handler,
            parser: CommandParser::new(),
            stats,
        }
    }

    /// Replaces the default parser, e.g. to change the bulk length limit.
    pub fn with_parser(mut self, parser: CommandParser) -> Self {
        self.parser = parser;
        self
    }

    /// Runs the session to completion.
    ///
    /// On a fatal error the client is sent a best-effort error reply before
    /// the error is returned.
    pub async fn run(mut self) -> Result<(), SessionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Closing connection");
                if let Some(reply) = e.error_reply() {
                    if let Err(write_err) = self.send_response(&reply).await {
                        debug!(client = %self.addr, error = %write_err, "Could not send error reply");
                    }
                }
            }
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), SessionError> {
        while let Some(parsed) = self.read_request().await? {
            let response = self.command_handler.handle(parsed);
            self.stats.command_processed();
            if response.is_error() {
                debug!(client = %self.addr, reply = %response, "Command rejected");
            }
            self.send_response(&response).await?;
        }
        Ok(())
    }

    /// Reads until one frame parses.
    ///
    /// Returns `Ok(None)` once the peer has closed or reset the connection,
    /// even if a frame was only partly received.
    async fn read_request(&mut self) -> Result<Option<Parsed>, SessionError> {
        loop {
            if let Some(parsed) = self.parser.parse(&mut self.buffer)? {
                trace!(client = %self.addr, remaining = self.buffer.len(), "Parsed command");
                return Ok(Some(parsed));
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = match self.stream.get_mut().read_buf(&mut self.buffer).await {
                Ok(n) => n,
                Err(e) if is_disconnect(&e) => {
                    debug!(client = %self.addr, error = %e, "Connection reset by client");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if self.parser.is_mid_frame() || !self.buffer.is_empty() {
                    debug!(client = %self.addr, buffered = self.buffer.len(), "Stream closed mid-frame");
                }
                return Ok(None);
            }

            self.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, "Read data");
        }
    }

    async fn send_response(&mut self, response: &RespValue) -> Result<(), SessionError> {
        self.out.clear();
        response.serialize_into(&mut self.out)?;
        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, bytes = self.out.len(), "Sent response");
        Ok(())
    }
}

/// Peer-initiated closes that end a session without being errors.
fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

/// Runs a session for an accepted connection and logs how it ended.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_bulk_len: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = Session::new(stream, addr, command_handler, stats)
        .with_parser(CommandParser::with_max_bulk_len(max_bulk_len));
    if let Err(e) = session.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}
