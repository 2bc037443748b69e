//! Storage - persistent documents for every SmartTrack domain
//!
//! A fixed set of keys ([`StorageKey`]) each hold one JSON document. Reads
//! come from an in-memory cache loaded at `init`; writes are validated,
//! cached and written through to a [`kvstore::KvBackend`]. When the backend
//! is unusable the store keeps working in memory-only mode.

mod keys;
mod store;
mod validation;

pub use keys::{StorageKey, UnknownKey};
pub use store::{CleanupReport, ExportDocument, Storage, StorageMode, StorageOptions, StorageSize};
pub use validation::{ValidationError, validate};
