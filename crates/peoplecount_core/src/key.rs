//! Key normalization.
//!
//! Natural keys (store name, user email, camera URL) are compared and
//! stored in a canonical form: surrounding whitespace trimmed, letters
//! uppercased. The same rule applies to every other stored text field.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Canonicalizes a raw string: trims whitespace and uppercases.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Normalizes a raw natural key.
///
/// # Example
///
/// ```rust
/// use peoplecount_core::normalize;
///
/// assert_eq!(normalize("  main branch "), normalize("MAIN BRANCH"));
/// assert_eq!(normalize("main branch").as_str(), "MAIN BRANCH");
/// ```
#[must_use]
pub fn normalize(raw: &str) -> NormalizedKey {
    NormalizedKey(normalize_text(raw))
}

/// A natural key in canonical form.
///
/// The only way to build one is through [`normalize`], so every key that
/// reaches the repository has already been canonicalized. Deserialization
/// normalizes as well.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NormalizedKey(String);

impl NormalizedKey {
    /// Returns the canonical string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if nothing was left after trimming.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for NormalizedKey {
    fn from(raw: String) -> Self {
        normalize(&raw)
    }
}

impl From<&str> for NormalizedKey {
    fn from(raw: &str) -> Self {
        normalize(raw)
    }
}

impl From<NormalizedKey> for String {
    fn from(key: NormalizedKey) -> Self {
        key.0
    }
}

impl AsRef<str> for NormalizedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NormalizedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A relationship set: ordered, duplicate-free normalized keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(BTreeSet<NormalizedKey>);

impl KeySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key. Returns false if it was already present.
    pub fn insert(&mut self, key: NormalizedKey) -> bool {
        self.0.insert(key)
    }

    /// Removes a key. Returns false if it was absent.
    pub fn remove(&mut self, key: &NormalizedKey) -> bool {
        self.0.remove(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &NormalizedKey) -> bool {
        self.0.contains(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = &NormalizedKey> {
        self.0.iter()
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<NormalizedKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = NormalizedKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a NormalizedKey;
    type IntoIter = std::collections::btree_set::Iter<'a, NormalizedKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_and_uppercases() {
        assert_eq!(normalize("  a@x.com\t").as_str(), "A@X.COM");
        assert_eq!(normalize("Main Branch"), normalize("MAIN BRANCH"));
        assert!(normalize("   ").is_empty());
    }

    #[test]
    fn uppercases_non_ascii() {
        assert_eq!(normalize("müller@straße.de").as_str(), "MÜLLER@STRASSE.DE");
    }

    #[test]
    fn deserialization_normalizes() {
        let key: NormalizedKey = serde_json::from_str("\" main \"").unwrap();
        assert_eq!(key.as_str(), "MAIN");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"MAIN\"");
    }

    #[test]
    fn key_set_is_sorted_and_unique() {
        let mut set = KeySet::new();
        assert!(set.insert(normalize("b")));
        assert!(set.insert(normalize("a")));
        assert!(!set.insert(normalize(" B ")));
        let keys: Vec<_> = set.iter().map(NormalizedKey::as_str).collect();
        assert_eq!(keys, ["A", "B"]);
        assert!(set.remove(&normalize("a")));
        assert!(!set.remove(&normalize("a")));
        assert_eq!(set.len(), 1);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in "[a-zA-Z0-9äöüß@._ -]{0,24}") {
            let once = normalize(&raw);
            let twice = normalize(once.as_str());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn surrounding_whitespace_is_ignored(raw in "[a-zA-Z0-9@. ]{0,16}", pad in "[ \t]{0,3}") {
            let padded = format!("{pad}{raw}{pad}");
            prop_assert_eq!(normalize(&padded), normalize(&raw));
        }
    }
}
