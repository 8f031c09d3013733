//! Inspect command implementation.

use super::{open, OpenArgs};
use peoplecount_core::{CollectionKind, Database, Principal};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Journal file size in bytes.
    pub journal_size: u64,
    /// Number of stores.
    pub stores: usize,
    /// Number of users.
    pub users: usize,
    /// Number of cameras.
    pub cameras: usize,
    /// Store-user links.
    pub user_links: usize,
    /// Store-camera links.
    pub camera_links: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, options: &OpenArgs, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open(path, options)?;
    let result = inspect(&db, path)?;
    db.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(db: &Database, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let repo = db.repository();
    let stores = db.session(Principal::admin("cli"))?.list_stores()?.stores;

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size: repo.journal_size()?,
        stores: repo.len(CollectionKind::Store),
        users: repo.len(CollectionKind::User),
        cameras: repo.len(CollectionKind::Camera),
        user_links: stores.iter().map(|s| s.users.len()).sum(),
        camera_links: stores.iter().map(|s| s.cameras.len()).sum(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("PeopleCount Database: {}", result.path);
    println!();
    println!("Journal:      {} bytes", result.journal_size);
    println!();
    println!("Documents:");
    println!("  Stores:     {}", result.stores);
    println!("  Users:      {}", result.users);
    println!("  Cameras:    {}", result.cameras);
    println!();
    println!("Links:");
    println!("  Store-user:   {}", result.user_links);
    println!("  Store-camera: {}", result.camera_links);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn counts_documents_and_links() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let session = db.session(Principal::admin("t")).unwrap();
        session
            .create_user(&json!({"email": "a@x.com", "password": "Secret123"}))
            .unwrap();
        session
            .create_store(&json!({"name": "main", "users": ["a@x.com"]}))
            .unwrap();
        session
            .create_camera(&json!({"url": "http://cam:554", "username": "u", "password": "p", "store": "main"}))
            .unwrap();

        let result = inspect(&db, dir.path()).unwrap();
        assert_eq!((result.stores, result.users, result.cameras), (1, 1, 1));
        assert_eq!((result.user_links, result.camera_links), (1, 1));
        assert!(result.journal_size > 0);
    }

    #[test]
    fn missing_database_is_an_error() {
        let dir = tempdir().unwrap();
        let result = run(&dir.path().join("absent"), &OpenArgs::default(), "text");
        assert!(result.is_err());
    }
}
