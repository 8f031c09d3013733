//! Property-based test generators using proptest.
//!
//! Key strategies produce raw spellings that must normalize to the same
//! key; [`GraphOp`] sequences drive relationship operations through
//! [`Session::execute`].

use crate::fixtures::{camera_url, store_name, user_email};
use peoplecount_core::{CoreResult, Operation, Session};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ]{0,14}[a-z0-9]").expect("Invalid regex")
}

/// Strategy for generating emails that pass validation.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9._]{0,10}@[a-z]{1,8}\\.(com|org|de)")
        .expect("Invalid regex")
}

/// Strategy for generating camera URLs that pass validation.
pub fn camera_url_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("(http|https|ws)://[a-z][a-z0-9]{0,8}:[1-9][0-9]{1,3}(/[a-z]{1,6})?")
        .expect("Invalid regex")
}

/// Strategy for another spelling of `key`: random letter case with
/// surrounding whitespace.
pub fn spelling_strategy(key: String) -> impl Strategy<Value = String> {
    let len = key.chars().count();
    (
        prop::collection::vec(any::<bool>(), len),
        0usize..3,
        0usize..3,
    )
        .prop_map(move |(upper, lead, trail)| {
            let body: String = key
                .chars()
                .zip(upper)
                .map(|(c, up)| {
                    if up {
                        c.to_ascii_uppercase()
                    } else {
                        c.to_ascii_lowercase()
                    }
                })
                .collect();
            format!("{}{body}{}", " ".repeat(lead), "\t".repeat(trail))
        })
}

/// One relationship operation over seeded indices.
///
/// Indices refer to [`store_name`], [`user_email`] and [`camera_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    /// Link a user to a store.
    Link {
        /// Store index.
        store: usize,
        /// User index.
        user: usize,
    },
    /// Unlink a user from a store.
    Unlink {
        /// Store index.
        store: usize,
        /// User index.
        user: usize,
    },
    /// Attach a camera to a store.
    Attach {
        /// Store index.
        store: usize,
        /// Camera index.
        camera: usize,
    },
    /// Detach a camera from a store.
    Detach {
        /// Store index.
        store: usize,
        /// Camera index.
        camera: usize,
    },
    /// Rename store `from` to store `to`.
    RenameStore {
        /// Current index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// Change user `from`'s email to user `to`'s.
    RenameUser {
        /// Current index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// Delete a store.
    DeleteStore(usize),
    /// Delete a user.
    DeleteUser(usize),
    /// Delete a camera.
    DeleteCamera(usize),
}

impl GraphOp {
    /// The operation and payload this step sends.
    pub fn request(&self) -> (Operation, Value) {
        match *self {
            Self::Link { store, user } => (
                Operation::AddUsersToStore,
                json!({"store_name": store_name(store), "user_email": user_email(user)}),
            ),
            Self::Unlink { store, user } => (
                Operation::RemoveUsersFromStore,
                json!({
                    "store_name": store_name(store).to_uppercase(),
                    "user_emails": [user_email(user).to_uppercase()]
                }),
            ),
            Self::Attach { store, camera } => (
                Operation::AddStoreToCamera,
                json!({"url": camera_url(camera), "store": store_name(store)}),
            ),
            Self::Detach { store, camera } => (
                Operation::RemoveStoreFromCamera,
                json!({"url": camera_url(camera), "store": store_name(store)}),
            ),
            Self::RenameStore { from, to } => (
                Operation::UpdateStore,
                json!({"name": store_name(from), "new_name": store_name(to)}),
            ),
            Self::RenameUser { from, to } => (
                Operation::UpdateUser,
                json!({"email": user_email(from), "new_email": user_email(to)}),
            ),
            Self::DeleteStore(i) => (
                Operation::DeleteStores,
                json!({"name": store_name(i), "force": true}),
            ),
            Self::DeleteUser(i) => (
                Operation::DeleteUsers,
                json!({"emails": [user_email(i)], "force": true}),
            ),
            Self::DeleteCamera(i) => (
                Operation::DeleteCameras,
                json!({"url": camera_url(i), "force": true}),
            ),
        }
    }

    /// Runs this step on `session`.
    ///
    /// # Errors
    ///
    /// Whatever the operation returns.
    pub fn apply(&self, session: &Session<'_>) -> CoreResult<Value> {
        let (op, payload) = self.request();
        session.execute(op, &payload)
    }
}

/// Strategy for relationship operations over `pool` seeded entities.
///
/// Renames may target indices up to `2 * pool`, so some land on free
/// keys and some collide.
pub fn graph_op_strategy(pool: usize) -> impl Strategy<Value = GraphOp> {
    let i = 0..pool;
    let wide = 0..pool * 2;
    prop_oneof![
        3 => (i.clone(), i.clone()).prop_map(|(store, user)| GraphOp::Link { store, user }),
        2 => (i.clone(), i.clone()).prop_map(|(store, user)| GraphOp::Unlink { store, user }),
        3 => (i.clone(), i.clone()).prop_map(|(store, camera)| GraphOp::Attach { store, camera }),
        2 => (i.clone(), i.clone()).prop_map(|(store, camera)| GraphOp::Detach { store, camera }),
        1 => (i.clone(), wide.clone()).prop_map(|(from, to)| GraphOp::RenameStore { from, to }),
        1 => (i.clone(), wide).prop_map(|(from, to)| GraphOp::RenameUser { from, to }),
        1 => i.clone().prop_map(GraphOp::DeleteStore),
        1 => i.clone().prop_map(GraphOp::DeleteUser),
        1 => i.prop_map(GraphOp::DeleteCamera),
    ]
}

/// Strategy for a sequence of up to `max_len` operations.
pub fn graph_ops_strategy(pool: usize, max_len: usize) -> impl Strategy<Value = Vec<GraphOp>> {
    prop::collection::vec(graph_op_strategy(pool), 1..=max_len)
}
