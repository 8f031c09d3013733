//! Whole-database consistency check.

use crate::entity::Document;
use crate::key::normalize_text;
use crate::repository::Repository;
use crate::types::{CollectionKind, EntityRef};
use serde::Serialize;
use std::fmt;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "camelCase")]
pub enum Violation {
    /// `from` lists `to`, but `to` does not list `from`.
    Asymmetric {
        /// Document holding the edge.
        from: EntityRef,
        /// Peer missing the mirror edge.
        to: EntityRef,
    },
    /// `from` lists a peer that does not exist.
    Dangling {
        /// Document holding the edge.
        from: EntityRef,
        /// The missing peer.
        to: EntityRef,
    },
    /// A stored string is not in normalized form.
    Unnormalized {
        /// The document.
        entity: EntityRef,
        /// The offending field.
        field: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asymmetric { from, to } => write!(f, "{from} lists {to}, which does not list it back"),
            Self::Dangling { from, to } => write!(f, "{from} lists missing {to}"),
            Self::Unnormalized { entity, field } => write!(f, "{entity} has unnormalized '{field}'"),
        }
    }
}

/// Result of [`check`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Documents examined.
    pub documents_checked: usize,
    /// Everything that was wrong.
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    /// True when no violation was found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks symmetry, dangling references and field normalization across
/// every collection.
///
/// Keys need no check: [`NormalizedKey`](crate::NormalizedKey) normalizes
/// on construction and on decode, and each collection is a map.
///
/// Collections are read one at a time, so the result is only exact when
/// no writer is active.
#[must_use]
pub fn check(repo: &Repository) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    for kind in CollectionKind::ALL {
        for stored in repo.list(kind) {
            report.documents_checked += 1;
            let document = &stored.document;
            let me = document.entity_ref();

            for field in unnormalized_fields(document) {
                report.violations.push(Violation::Unnormalized {
                    entity: me.clone(),
                    field: field.to_owned(),
                });
            }

            for peer in document.edges() {
                match repo.find(peer.kind, &peer.key) {
                    None => report.violations.push(Violation::Dangling {
                        from: me.clone(),
                        to: peer,
                    }),
                    Some(other) => {
                        let mirrored = other
                            .document
                            .links(kind)
                            .is_ok_and(|links| links.contains(&me.key));
                        if !mirrored {
                            report.violations.push(Violation::Asymmetric {
                                from: me.clone(),
                                to: peer,
                            });
                        }
                    }
                }
            }
        }
    }
    report
}

fn unnormalized_fields(document: &Document) -> Vec<&'static str> {
    let fields: Vec<(&'static str, &str)> = match document {
        Document::Store(s) => vec![("clientID", s.client_id.as_str()), ("address", s.address.as_str())],
        Document::User(u) => vec![
            ("clientID", u.client_id.as_str()),
            ("name", u.name.as_str()),
            ("tel", u.tel.as_str()),
            ("address", u.address.as_str()),
        ],
        Document::Camera(c) => vec![("name", c.name.as_str())],
    };
    fields
        .into_iter()
        .filter(|(_, value)| normalize_text(value) != *value)
        .map(|(field, _)| field)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordHash;
    use crate::entity::{Entity, Store, User};
    use crate::journal::Journal;
    use crate::key::normalize;
    use crate::repository::LinkEdit;
    use crate::types::Version;
    use peoplecount_storage::InMemoryBackend;

    fn repo() -> Repository {
        Repository::open(Journal::new(Box::new(InMemoryBackend::new()), false)).unwrap()
    }

    #[test]
    fn empty_and_clean_databases_pass() {
        let repo = repo();
        assert!(check(&repo).is_ok());

        repo.create(Store::new(normalize("s")).into_document()).unwrap();
        let report = check(&repo);
        assert!(report.is_ok());
        assert_eq!(report.documents_checked, 1);
    }

    #[test]
    fn one_sided_and_dangling_edges_are_reported() {
        let repo = repo();
        repo.create(Store::new(normalize("s")).into_document()).unwrap();
        repo.create(User::new(normalize("u@x.com"), PasswordHash::from_encoded("h")).into_document())
            .unwrap();

        let store = EntityRef::store(normalize("s"));
        repo.edit_links(&store, CollectionKind::User, Version::INITIAL, &LinkEdit::Insert(normalize("u@x.com")))
            .unwrap();
        repo.edit_links(&store, CollectionKind::Camera, Version::new(2), &LinkEdit::Insert(normalize("http://gone:1")))
            .unwrap();

        let violations = check(&repo).violations;
        assert_eq!(violations.len(), 2);
        assert!(violations.contains(&Violation::Asymmetric {
            from: store.clone(),
            to: EntityRef::user(normalize("u@x.com")),
        }));
        assert!(violations.contains(&Violation::Dangling {
            from: store,
            to: EntityRef::camera(normalize("http://gone:1")),
        }));
    }

    #[test]
    fn lowercase_fields_are_reported() {
        let repo = repo();
        let mut store = Store::new(normalize("s"));
        store.address = "lower street".into();
        repo.create(store.into_document()).unwrap();

        let violations = check(&repo).violations;
        assert_eq!(
            violations,
            [Violation::Unnormalized {
                entity: EntityRef::store(normalize("s")),
                field: "address".into(),
            }]
        );
        assert_eq!(violations[0].to_string(), "stores/S has unnormalized 'address'");
    }
}
