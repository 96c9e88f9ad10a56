//! Storage Module
//!
//! A single shared map guarded by one lock, with expiry applied lazily when a
//! key is read.
//!
//! ## Example
//!
//! ```
//! use sparkkv::storage::Store;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(Store::new());
//!
//! store.set(Bytes::from("name"), Bytes::from("Ariz"), None);
//! assert_eq!(store.get(b"name"), Some(Bytes::from("Ariz")));
//!
//! store.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! ```

pub mod engine;

pub use engine::{Entry, Store, StoreStats};
