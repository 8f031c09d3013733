//! CLI command implementations.

pub mod compact;
pub mod exec;
pub mod inspect;
pub mod verify;

use peoplecount_core::auth::PasswordHash;
use peoplecount_core::{Config, Database};
use std::path::Path;

/// Options shared by every command that opens a database.
#[derive(Debug, Clone, Default)]
pub struct OpenArgs {
    /// Create the directory if it does not exist.
    pub create: bool,
    /// Encoded super password hash for `resetPassword`.
    pub super_password_hash: Option<String>,
}

/// Opens the database at `path` with `options` mapped onto [`Config`].
pub fn open(path: &Path, options: &OpenArgs) -> Result<Database, Box<dyn std::error::Error>> {
    let mut config = Config::new().create_if_missing(options.create);
    if let Some(encoded) = &options.super_password_hash {
        config = config.super_password_hash(PasswordHash::from_encoded(encoded.clone()));
    }
    Ok(Database::open_with_config(path, config)?)
}
