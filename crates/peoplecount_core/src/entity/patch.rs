//! Field patches applied by `Repository::update`.

use crate::auth::PasswordHash;
use crate::entity::{Document, VerbatimCredential};
use crate::error::{CoreError, CoreResult};
use crate::key::normalize_text;
use std::collections::BTreeMap;

/// New value for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Plain text. Trimmed, and uppercased unless the field keeps its case.
    Text(String),
    /// A password hash.
    Hash(PasswordHash),
}

/// A set of field edits for a single document.
///
/// Only scalar fields can be patched. Keys change through rename and
/// relationship sets through the synchronizer; both are rejected here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    fields: BTreeMap<String, FieldValue>,
}

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a text field.
    #[must_use]
    pub fn text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(field.into(), FieldValue::Text(value.into()));
        self
    }

    /// Sets a hash field.
    #[must_use]
    pub fn hash(mut self, field: impl Into<String>, value: PasswordHash) -> Self {
        self.fields.insert(field.into(), FieldValue::Hash(value));
        self
    }

    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in the patch.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Checks every field against the document's schema without writing.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown fields, key fields,
    /// relationship sets and mistyped values.
    pub fn check(&self, document: &Document) -> CoreResult<()> {
        let mut scratch = document.clone();
        self.apply(&mut scratch).map(|_| ())
    }

    /// Applies the patch. Returns true if any field changed.
    ///
    /// # Errors
    ///
    /// See [`Patch::check`]. On error the document may be partially
    /// modified, so callers apply to a copy.
    pub fn apply(&self, document: &mut Document) -> CoreResult<bool> {
        let kind = document.kind();
        let mut changed = false;

        for (field, value) in &self.fields {
            if field.as_str() == kind.key_field() {
                return Err(CoreError::validation(
                    field,
                    "the key changes only through rename",
                ));
            }
            if kind
                .peers()
                .iter()
                .any(|&peer| kind.link_field(peer) == Some(field.as_str()))
            {
                return Err(CoreError::validation(
                    field,
                    "relationships change only through link and unlink",
                ));
            }

            let slot = match (&mut *document, field.as_str()) {
                (Document::Store(s), "clientID") => Slot::Text(&mut s.client_id),
                (Document::Store(s), "address") => Slot::Text(&mut s.address),
                (Document::User(u), "clientID") => Slot::Text(&mut u.client_id),
                (Document::User(u), "name") => Slot::Text(&mut u.name),
                (Document::User(u), "tel") => Slot::Text(&mut u.tel),
                (Document::User(u), "address") => Slot::Text(&mut u.address),
                (Document::User(u), "passwordHash") => Slot::Hash(&mut u.password_hash),
                (Document::Camera(c), "name") => Slot::Text(&mut c.name),
                (Document::Camera(c), "username") => Slot::Trimmed(&mut c.username),
                (Document::Camera(c), "password") => Slot::Credential(&mut c.password),
                _ => {
                    return Err(CoreError::validation(
                        field,
                        format!("not a field of {kind}"),
                    ))
                }
            };
            changed |= slot.assign(field, value)?;
        }

        Ok(changed)
    }
}

enum Slot<'a> {
    Text(&'a mut String),
    Trimmed(&'a mut String),
    Credential(&'a mut VerbatimCredential),
    Hash(&'a mut PasswordHash),
}

impl Slot<'_> {
    fn assign(self, field: &str, value: &FieldValue) -> CoreResult<bool> {
        match (self, value) {
            (Self::Text(slot), FieldValue::Text(raw)) => Ok(replace(slot, normalize_text(raw))),
            (Self::Trimmed(slot), FieldValue::Text(raw)) => Ok(replace(slot, raw.trim().to_owned())),
            (Self::Credential(slot), FieldValue::Text(raw)) => {
                Ok(replace(slot, VerbatimCredential::new(raw.trim())))
            }
            (Self::Hash(slot), FieldValue::Hash(hash)) => Ok(replace(slot, hash.clone())),
            (Self::Hash(_), FieldValue::Text(_)) => {
                Err(CoreError::validation(field, "expected a password hash"))
            }
            (_, FieldValue::Hash(_)) => Err(CoreError::validation(field, "expected text")),
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
