//! # focusync storage
//!
//! Durable persistence for pending remote deletions ("tombstones").
//!
//! Stores are **opaque string-set stores** keyed by `(collection, owner)`.
//! They do not know what a record is; the sync engine owns the meaning of
//! the IDs it saves.
//!
//! ## Design Principles
//!
//! - One independent ID set per `(collection, owner)` key
//! - `save` replaces the whole set and is durable once it returns
//! - Must be `Send + Sync` so syncers on different tasks can share a store
//!
//! ## Available Stores
//!
//! - [`InMemoryTombstoneStore`] - For testing and ephemeral sessions
//! - [`FileTombstoneStore`] - One JSON document per key, atomically replaced
//!
//! ## Example
//!
//! ```rust
//! use focusync_storage::{InMemoryTombstoneStore, TombstoneKey, TombstoneStore};
//! use std::collections::BTreeSet;
//!
//! let store = InMemoryTombstoneStore::new();
//! let key = TombstoneKey::new("presets", "alice");
//! store.save(&key, &BTreeSet::from(["p1".to_string()])).unwrap();
//! assert!(store.load(&key).unwrap().contains("p1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileTombstoneStore;
pub use memory::InMemoryTombstoneStore;
pub use store::{TombstoneKey, TombstoneStore};
