//! # PeopleCount Testkit
//!
//! Test utilities for PeopleCount.
//!
//! This crate provides:
//! - Test databases and seeded scenarios
//! - Property-based generators for keys and relationship operations
//! - Concurrent stress runs that finish with an integrity check
//!
//! ## Usage
//!
//! ```rust
//! use peoplecount_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let session = admin(db);
//!     session
//!         .create_store(&serde_json::json!({"name": store_name(0)}))
//!         .unwrap();
//!     assert!(db.verify().unwrap().is_ok());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
