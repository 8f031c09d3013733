//! Compact command implementation.

use super::{open, OpenArgs};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, options: &OpenArgs, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting journal at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let db = open(path, options)?;
    let before = db.repository().journal_size()?;
    println!("  Size before: {} bytes", before);
    if dry_run {
        db.close()?;
        return Ok(());
    }

    db.compact()?;
    let after = db.repository().journal_size()?;
    db.close()?;

    println!("  Size after:  {} bytes", after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        before.saturating_sub(after),
        if before > 0 {
            (before.saturating_sub(after) as f64 / before as f64) * 100.0
        } else {
            0.0
        }
    );

    Ok(())
}
