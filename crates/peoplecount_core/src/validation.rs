//! Request payload validation.
//!
//! Pure checks run before anything touches the repository: field
//! presence and type, email and URL shape, password complexity, fields
//! that may not appear in a given request, and the `force` confirmation
//! on destructive batch operations.
//!
//! Field names are matched case-insensitively, so `clientId` and
//! `clientID` address the same field.

use crate::error::{CoreError, CoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// A JSON request body.
pub type Payload = Map<String, Value>;

type Pattern = Lazy<Result<Regex, regex::Error>>;

static EMAIL: Pattern = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+\-äöüßÄÖÜ]+@[A-Z0-9.\-äöüßÄÖÜ]+\.[A-Z]{2,}$")
});

static URL: Pattern = Lazy::new(|| {
    Regex::new(r"(?i)^(https?|wss?)://(([A-Z0-9\-.]+)|(\[[A-F0-9:]+\])):(\d+)(/.*)?$")
});

fn pattern(compiled: &'static Pattern) -> CoreResult<&'static Regex> {
    compiled
        .as_ref()
        .map_err(|e| CoreError::invalid_operation(format!("pattern: {e}")))
}

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Checks `local@domain.tld` shape. German umlauts and ß are accepted.
///
/// # Errors
///
/// Returns a validation error naming `field`.
pub fn validate_email(field: &str, email: &str) -> CoreResult<()> {
    if pattern(&EMAIL)?.is_match(email.trim()) {
        Ok(())
    } else {
        Err(CoreError::validation(
            field,
            format!("invalid email format: {email}"),
        ))
    }
}

/// Checks that a URL has an http(s)/ws(s) scheme, a host and a port.
///
/// # Errors
///
/// Returns a validation error naming `field`.
pub fn validate_url(field: &str, url: &str) -> CoreResult<()> {
    if pattern(&URL)?.is_match(url.trim()) {
        Ok(())
    } else {
        Err(CoreError::validation(
            field,
            "must be a valid URL including port, e.g. http://192.168.1.100:554",
        ))
    }
}

/// Checks password complexity: at least eight characters, one uppercase
/// letter and one digit.
///
/// # Errors
///
/// Returns a validation error naming `field`.
pub fn validate_password(field: &str, password: &str) -> CoreResult<()> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let single_line = !password.contains('\n');
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(char::is_numeric);

    if long_enough && single_line && has_upper && has_digit {
        Ok(())
    } else {
        Err(CoreError::validation(
            field,
            "must be at least 8 characters and contain an uppercase letter and a digit",
        ))
    }
}

/// Returns the body as an object, rejecting anything else or `{}`.
///
/// # Errors
///
/// Returns a validation error if the body is not a non-empty object.
pub fn as_payload(body: &Value) -> CoreResult<&Payload> {
    match body {
        Value::Object(map) if !map.is_empty() => Ok(map),
        _ => Err(CoreError::invalid_payload("body cannot be empty")),
    }
}

/// Looks up a field case-insensitively, preferring an exact match.
#[must_use]
pub fn lookup<'a>(payload: &'a Payload, field: &str) -> Option<&'a Value> {
    payload.get(field).or_else(|| {
        payload
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    })
}

/// Returns true if any of `fields` is present and not null.
#[must_use]
pub fn has_any(payload: &Payload, fields: &[&str]) -> bool {
    fields
        .iter()
        .any(|field| lookup(payload, field).is_some_and(|v| !v.is_null()))
}

/// Rejects every field in `forbidden`.
///
/// # Errors
///
/// Returns a validation error naming the first forbidden field found,
/// with `hint` as the message.
pub fn reject_fields(payload: &Payload, forbidden: &[&str], hint: &str) -> CoreResult<()> {
    for name in payload.keys() {
        if forbidden.iter().any(|f| name.eq_ignore_ascii_case(f)) {
            return Err(CoreError::validation(name, hint));
        }
    }
    Ok(())
}

/// Rejects every field not in `allowed`.
///
/// # Errors
///
/// Returns a validation error naming the first unknown field.
pub fn allow_only(payload: &Payload, allowed: &[&str]) -> CoreResult<()> {
    for name in payload.keys() {
        if !allowed.iter().any(|a| name.eq_ignore_ascii_case(a)) {
            return Err(CoreError::validation(name, "is not allowed here"));
        }
    }
    Ok(())
}

/// Requires `force: true`; any other value, including `"true"`, fails.
///
/// # Errors
///
/// Returns a validation error on `force`.
pub fn require_force(payload: &Payload) -> CoreResult<()> {
    match lookup(payload, "force") {
        Some(Value::Bool(true)) => Ok(()),
        _ => Err(CoreError::validation(
            "force",
            "confirm with 'force': true",
        )),
    }
}

/// Reads a required, non-blank string.
///
/// # Errors
///
/// Returns a validation error if the field is absent, not a string or
/// blank.
pub fn required_str<'a>(payload: &'a Payload, field: &str) -> CoreResult<&'a str> {
    optional_str(payload, field)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CoreError::validation(field, "is required"))
}

/// Reads an optional string. Absent and `null` yield `None`.
///
/// # Errors
///
/// Returns a validation error if the field holds a non-string.
pub fn optional_str<'a>(payload: &'a Payload, field: &str) -> CoreResult<Option<&'a str>> {
    match lookup(payload, field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(CoreError::validation(field, "must be a string")),
    }
}

/// Reads an optional string that must not be blank when present.
///
/// # Errors
///
/// Returns a validation error if the field is present but not a
/// non-empty string.
pub fn non_blank_str<'a>(payload: &'a Payload, field: &str) -> CoreResult<Option<&'a str>> {
    match optional_str(payload, field) {
        Ok(Some(s)) if s.trim().is_empty() => Err(blank(field)),
        Ok(value) => Ok(value),
        Err(_) => Err(blank(field)),
    }
}

fn blank(field: &str) -> CoreError {
    CoreError::validation(field, "must be a non-empty string")
}

/// Reads the first present field among `aliases` as a required string.
///
/// # Errors
///
/// Returns a validation error naming the first alias if none is present.
pub fn required_alias<'a>(payload: &'a Payload, aliases: &[&str]) -> CoreResult<&'a str> {
    for alias in aliases {
        if let Some(value) = non_blank_str(payload, alias)? {
            return Ok(value);
        }
    }
    Err(CoreError::validation(
        aliases.first().copied().unwrap_or("key"),
        format!("is required (accepted: {})", aliases.join(", ")),
    ))
}

/// Reads an optional list of strings; blank entries are skipped.
///
/// # Errors
///
/// Returns a validation error if the field is not a list or holds a
/// non-string entry.
pub fn string_list(payload: &Payload, field: &str) -> CoreResult<Option<Vec<String>>> {
    match lookup(payload, field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => collect_strings(field, items).map(Some),
        Some(_) => Err(CoreError::validation(field, "must be a list of strings")),
    }
}

/// Reads a field holding either one string or a list of strings.
///
/// Blank entries are skipped; the result is never empty.
///
/// # Errors
///
/// Returns a validation error if the field is absent, of the wrong type,
/// or yields no usable entry.
pub fn one_or_many(payload: &Payload, field: &str) -> CoreResult<Vec<String>> {
    let values = match lookup(payload, field) {
        Some(item @ Value::String(_)) => collect_strings(field, std::slice::from_ref(item))?,
        Some(Value::Array(items)) => collect_strings(field, items)?,
        None | Some(Value::Null) => return Err(CoreError::validation(field, "is required")),
        Some(_) => {
            return Err(CoreError::validation(
                field,
                "must be a string or list of strings",
            ))
        }
    };
    if values.is_empty() {
        return Err(CoreError::validation(field, "contains no usable entries"));
    }
    Ok(values)
}

fn collect_strings(field: &str, items: &[Value]) -> CoreResult<Vec<String>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) if s.trim().is_empty() => {}
            Value::String(s) => out.push(s.clone()),
            _ => {
                return Err(CoreError::validation(
                    field,
                    "must contain only strings",
                ))
            }
        }
    }
    Ok(out)
}

/// Reads a non-negative whole number, accepting integral floats.
///
/// # Errors
///
/// Returns a validation error for negatives, fractions and non-numbers.
pub fn optional_count(payload: &Payload, field: &str) -> CoreResult<Option<u64>> {
    match lookup(payload, field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .map(Some)
            .ok_or_else(|| CoreError::validation(field, "must be a non-negative whole number")),
        Some(_) => Err(CoreError::validation(field, "must be a number")),
    }
}
