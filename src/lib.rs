//! # SparkKV - A Small In-Memory Key-Value Server
//!
//! SparkKV speaks the RESP wire protocol and supports `PING`, `ECHO`, `GET`
//! and `SET` with an optional millisecond expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             SparkKV                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│  Session    │───>│  Command    │           │
//! │  │ (Listener)  │    │ (per conn)  │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌─────────────────────┐   │
//! │                     │  Command    │    │        Store        │   │
//! │                     │  Parser     │    │  Mutex<HashMap>     │   │
//! │                     └─────────────┘    │  lazy expiry        │   │
//! │                                        └─────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use sparkkv::connection::ConnectionStats;
//! use sparkkv::storage::Store;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(Store::new());
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     sparkkv::server::run(listener, storage, stats, 64 * 1024).await;
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO message`
//! - `GET key`
//! - `SET key value [PX milliseconds]`
//!
//! Any other verb gets a `+unsupported command '<verb>'` status reply and the
//! connection stays open.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Reply encoding, the command table and the request parser
//! - [`storage`]: The shared store with lazy expiry
//! - [`commands`]: Command dispatch
//! - [`connection`]: Per-connection sessions
//! - [`server`]: The accept loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats, Session, SessionError};
pub use protocol::{Command, CommandKind, CommandParser, ParseError, Parsed, RespValue};
pub use storage::Store;

/// The default port SparkKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host SparkKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Smallest worker pool the server runs with.
pub const MIN_WORKERS: usize = 4;

/// Version of SparkKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
