//! Connection Handling
//!
//! Each client connection is owned by one [`Session`], running as its own
//! task on the runtime's worker pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Session                               │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse frame │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │         ▲                                     ▼             │
//! │         │                             ┌─────────────┐       │
//! │         └─────────────────────────────│ Send reply  │       │
//! │                                       └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use sparkkv::connection::{handle_connection, ConnectionStats};
//! use sparkkv::commands::CommandHandler;
//! use sparkkv::storage::Store;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(Store::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&storage));
//! tokio::spawn(handle_connection(stream, addr, handler, stats, 64 * 1024));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionStats, Session, SessionError};
