//! KvStore - durable string key-value store with local-storage semantics
//!
//! Every key maps to one opaque string value. Values are written atomically and
//! the total size of a store can be capped with a byte quota, mirroring the
//! storage area a browser grants a single origin.
//!
//! # Architecture
//!
//! ```text
//! <store-path>/
//! ├── .lock                      # exclusive advisory lock (one writer)
//! ├── smarttrack_exercises.json  # one file per key
//! ├── smarttrack_sessions.json
//! └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kvstore::{FileBackend, KvBackend};
//!
//! let backend = FileBackend::open("/tmp/store")?.with_quota(Some(5 * 1024 * 1024));
//! backend.set_item("greeting", "\"hello\"").await?;
//! assert_eq!(backend.get_item("greeting").await?, Some("\"hello\"".to_string()));
//! ```

pub mod cli;
pub mod config;
mod backend;
mod error;
mod file;
mod memory;

pub use backend::{KvBackend, entry_size, validate_key};
pub use error::{KvError, KvResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Default quota (5 MiB), the per-origin budget most browsers grant local storage
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
