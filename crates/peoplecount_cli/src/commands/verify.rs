//! Verify command implementation.

use super::{open, OpenArgs};
use std::path::Path;

/// Runs the verify command.
///
/// Opening the database replays the journal, which fails on a damaged
/// record; the integrity check then covers relationships.
pub fn run(path: &Path, options: &OpenArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {:?}", path);
    println!();

    let db = open(path, options)?;
    println!("Journal replayed ({} bytes)", db.repository().journal_size()?);

    let report = db.verify()?;
    db.close()?;
    println!("Checked {} documents", report.documents_checked);
    for violation in &report.violations {
        println!("  - {violation}");
    }

    println!();
    if report.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!(
            "✗ Database verification failed ({} violations)",
            report.violations.len()
        );
        Err("Verification failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peoplecount_core::{Database, Principal};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn consistent_database_passes() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.session(Principal::admin("t"))
                .unwrap()
                .create_store(&json!({"name": "main"}))
                .unwrap();
        }
        run(dir.path(), &OpenArgs::default()).unwrap();
    }
}
