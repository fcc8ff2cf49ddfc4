//! USSD Core - session storage and request pipeline
//!
//! This crate provides:
//! - Byte-oriented storage backends (memory, SQLite, Redis)
//! - Type-tagged per-session user data
//! - Positional indexed lists
//! - The symbolic flag table
//! - Exclusive session checkout and the per-request pipeline
//! - Graceful shutdown coordination

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod flags;
pub mod indexed_list;
pub mod keyed_store;
pub mod pipeline;
pub mod provider;
pub mod shutdown;

pub use backend::{Backend, Backends, MemoryBackend, RedisBackend, SqliteBackend, StorageConfig};
pub use error::{Error, Result};
pub use flags::{FlagBits, FlagTable};
pub use indexed_list::IndexedListStore;
pub use keyed_store::{FieldType, KeyedStore, UserDataStore};
pub use pipeline::{Interpreter, RequestSession, SessionPipeline, StepOutcome};
pub use provider::{SessionBundle, SessionLease, SessionState, SimpleStorageProvider, StorageProvider, TurnCache};
pub use shutdown::{wait_for_shutdown_signal, RequestGuard, ShutdownController, ShutdownPhase};
