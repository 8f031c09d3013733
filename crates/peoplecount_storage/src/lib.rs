//! # PeopleCount Storage
//!
//! Byte-level storage for the PeopleCount document journal.
//!
//! Backends are **opaque, append-only byte logs**. They know nothing about
//! documents, journal records or checksums; `peoplecount_core` owns the
//! record format and hands finished records to a backend.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and throwaway databases
//! - [`FileBackend`] - For persistent storage on the local file system
//!
//! ## Example
//!
//! ```rust
//! use peoplecount_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"record-1").unwrap();
//! backend.append(b"record-2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"record-1record-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
