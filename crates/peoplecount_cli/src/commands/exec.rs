//! Exec command implementation.

use super::{open, OpenArgs};
use peoplecount_core::{Operation, Principal};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Runs the exec command and prints the result as JSON.
pub fn run(
    path: &Path,
    options: &OpenArgs,
    operation: &str,
    payload: &str,
    as_user: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let op: Operation = operation.parse()?;
    let payload = parse_payload(op, payload)?;
    let principal = match as_user {
        Some(email) => Principal::user(email),
        None => Principal::admin("cli"),
    };

    let db = open(path, options)?;
    let result = db.session(principal)?.execute(op, &payload);
    db.close()?;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

/// Reads the whole of stdin.
pub fn read_stdin() -> Result<String, Box<dyn std::error::Error>> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

/// Parses `text` as JSON. Blank input is `null`, which only read-only
/// operations accept.
fn parse_payload(op: Operation, text: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if text.trim().is_empty() {
        if op.is_read_only() {
            return Ok(Value::Null);
        }
        return Err(format!("{op} needs a JSON payload").into());
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn blank_payload_only_for_reads() {
        assert_eq!(parse_payload(Operation::ListStores, "  ").unwrap(), Value::Null);
        assert!(parse_payload(Operation::CreateStore, "").is_err());
        assert!(parse_payload(Operation::CreateStore, "{not json").is_err());
    }

    #[test]
    fn exec_writes_through_to_the_journal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let options = OpenArgs {
            create: true,
            ..Default::default()
        };

        run(&path, &options, "createStore", r#"{"name": "main"}"#, None).unwrap();
        run(&path, &options, "liststores", "", None).unwrap();
        assert!(run(&path, &options, "noSuchOp", "{}", None).is_err());

        let db = open(&path, &options).unwrap();
        assert_eq!(db.session(Principal::admin("t")).unwrap().list_stores().unwrap().stores.len(), 1);
    }
}
