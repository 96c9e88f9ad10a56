//! Thread-Safe Key-Value Store with Lazy Expiry
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: A single `Mutex` covers every read and write. Each command
//!    takes the lock once, so contention stays low at this scale.
//! 2. **Lazy Expiry**: There is no background sweeper. An expired entry is
//!    removed by the `get` that notices it, inside the same critical section.
//! 3. **Owned Entries**: Keys and values live in their own allocations; a `set`
//!    replaces the whole entry.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │                Store                 │
//! │  ┌────────────────────────────────┐  │
//! │  │ Mutex<HashMap<Bytes, Entry>>   │  │
//! │  └────────────────────────────────┘  │
//! └──────────────────────────────────────┘
//!     ▲          ▲           ▲
//!  session    session     session
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry that expires `ttl` after `now`.
    ///
    /// A deadline past what `Instant` can represent is treated as no expiry.
    pub fn new(value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    /// An entry is expired from its deadline onwards, so a zero TTL is
    /// never readable.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Counters exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: u64,
    pub get_count: u64,
    pub set_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired_count: u64,
}

/// The shared key-value store.
///
/// Constructed once at startup and handed to every session through an `Arc`.
///
/// # Example
///
/// ```
/// use sparkkv::storage::Store;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let store = Store::new();
///
/// store.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(store.get(b"name"), Some(Bytes::from("Ariz")));
///
/// store.set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::ZERO));
/// assert_eq!(store.get(b"session"), None);
/// ```
#[derive(Default)]
pub struct Store {
    entries: Mutex<HashMap<Bytes, Entry>>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the store lock.
    ///
    /// Every mutation is a single `insert` or `remove`, so a panic in another
    /// holder cannot leave the map half-updated and poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired key
    /// is removed before the lock is released.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.lock();
        let now = Instant::now();

        let value = match entries.get(key) {
            None => None,
            // `Bytes` is immutable; the reply shares the buffer but can never
            // observe a later SET, which swaps in a new buffer.
            Some(entry) if !entry.is_expired_at(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        };
        drop(entries);

        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    /// Sets a key, replacing any previous value and expiry.
    ///
    /// With `ttl`, the key expires `ttl` from now; without, it never expires.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.lock();
        let entry = Entry::new(value, ttl, Instant::now());
        entries.insert(key, entry).is_none()
    }

    /// Number of stored keys, including expired ones not yet accessed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len() as u64,
            get_count: self.get_count.load(Ordering::Relaxed),
            set_count: self.set_count.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_count: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
