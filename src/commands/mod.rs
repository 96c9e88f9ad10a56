//! Command Handler Module
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandParser   │  (protocol module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Store           │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::CommandHandler;
