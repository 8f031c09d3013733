//! Super-user password reset and token expiry.

use super::{Principal, Session};
use crate::auth::{unix_millis, TokenPolicy};
use crate::entity::Patch;
use crate::error::{CoreError, CoreResult};
use crate::key::{normalize, NormalizedKey};
use crate::types::{CollectionKind, EntityRef};
use crate::validation::{
    as_payload, optional_count, require_force, required_str, validate_email, validate_password,
    Payload,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const UNITS: [(&str, u64); 4] = [("second", 1), ("minute", 60), ("hour", 3_600), ("day", 86_400)];

/// Result of `resetPassword`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordReset {
    /// The user whose password was replaced.
    pub email: NormalizedKey,
}

impl Session<'_> {
    /// Replaces a user's password, authorized by the super password.
    ///
    /// Payload: `{super_password, email, new_password, force: true}`.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` without a configured super password hash,
    /// `Unauthorized` if `super_password` does not match, `NotFound` for
    /// an unknown user, and a validation error for a missing field,
    /// `force` other than `true`, or a weak `new_password`.
    pub fn reset_password(&self, body: &Value) -> CoreResult<PasswordReset> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        require_force(payload)?;
        let super_password = required_str(payload, "super_password")?;
        let email = required_str(payload, "email")?;
        validate_email("email", email)?;
        let new_password = required_str(payload, "new_password")?;

        let expected = db
            .config()
            .super_password_hash
            .as_ref()
            .ok_or_else(|| CoreError::NotConfigured {
                what: "super password".into(),
            })?;
        let hasher = db.password_hasher();
        if !hasher.verify(super_password, expected) {
            warn!(subject = ?self.principal().subject(), "super password rejected");
            return Err(CoreError::unauthorized("invalid super password"));
        }
        validate_password("new_password", new_password)?;

        let user = EntityRef::user(normalize(email));
        let _guard = db.synchronizer().locks().acquire([user.clone()])?;
        db.repository().get(user.kind, &user.key)?;
        let patch = Patch::new().hash("passwordHash", hasher.hash(new_password)?);
        db.repository().update(CollectionKind::User, &user.key, &patch)?;

        info!(user = %user.key, "password reset");
        Ok(PasswordReset { email: user.key })
    }

    /// Changes token lifetimes and revokes every token issued so far.
    ///
    /// Payload: any of `access_second`, `access_minute`, `access_hour`,
    /// `access_day` and the same with `refresh_`. Units of one prefix are
    /// added up; a prefix with no unit keeps its current lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is an admin, and a validation
    /// error if no value is given or a lifetime adds up to zero.
    pub fn set_token_expiry(&self, body: &Value) -> CoreResult<TokenPolicy> {
        let db = self.db()?;
        if !matches!(self.principal(), Principal::Admin { .. }) {
            return Err(CoreError::Forbidden {
                reason: "token expiry is an admin operation".into(),
            });
        }
        let payload = as_payload(body)?;
        let access = lifetime(payload, "access")?;
        let refresh = lifetime(payload, "refresh")?;
        if access.is_none() && refresh.is_none() {
            return Err(CoreError::invalid_payload(
                "give at least one of access_* or refresh_* (second, minute, hour, day)",
            ));
        }

        let policy = db.token_policy().update(access, refresh, unix_millis());
        info!(
            version = policy.version,
            access_secs = policy.access_ttl.as_secs(),
            refresh_secs = policy.refresh_ttl.as_secs(),
            "token policy updated"
        );
        Ok(policy.as_ref().clone())
    }
}

/// Sums `{prefix}_second` … `{prefix}_day`. `None` if none is present.
fn lifetime(payload: &Payload, prefix: &str) -> CoreResult<Option<Duration>> {
    let mut total: Option<u64> = None;
    for (unit, scale) in UNITS {
        let field = format!("{prefix}_{unit}");
        let Some(count) = optional_count(payload, &field)? else {
            continue;
        };
        let secs = count
            .checked_mul(scale)
            .and_then(|secs| secs.checked_add(total.unwrap_or(0)))
            .ok_or_else(|| CoreError::validation(&field, "lifetime is too large"))?;
        total = Some(secs);
    }

    match total {
        Some(0) => Err(CoreError::validation(
            format!("{prefix}_*"),
            "lifetime must be greater than zero",
        )),
        other => Ok(other.map(Duration::from_secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HmacPasswordHasher, PasswordHasher};
    use crate::config::Config;
    use crate::database::Database;
    use crate::entity::User;
    use crate::error::ErrorKind;
    use peoplecount_storage::InMemoryBackend;
    use serde_json::json;

    fn db(super_password: Option<&str>) -> Database {
        let mut config = Config::new();
        if let Some(plain) = super_password {
            config = config.super_password_hash(HmacPasswordHasher::new().hash(plain).unwrap());
        }
        let db = Database::open_with_backend(config, Box::new(InMemoryBackend::new())).unwrap();
        db.session(Principal::admin("root"))
            .unwrap()
            .create_user(&json!({"email": "a@x.com", "password": "Secret123"}))
            .unwrap();
        db
    }

    fn reset(new_password: &str, super_password: &str) -> Value {
        json!({
            "super_password": super_password,
            "email": "A@x.com",
            "new_password": new_password,
            "force": true
        })
    }

    #[test]
    fn reset_replaces_hash() {
        let db = db(Some("Master123"));
        let session = db.session(Principal::admin("root")).unwrap();
        let done = session.reset_password(&reset("Fresh1234", "Master123")).unwrap();
        assert_eq!(done.email, normalize("a@x.com"));

        let user = db.repository().fetch::<User>(&normalize("a@x.com")).unwrap();
        assert!(db.password_hasher().verify("Fresh1234", &user.password_hash));
    }

    #[test]
    fn reset_failures() {
        let db = db(Some("Master123"));
        let session = db.session(Principal::admin("root")).unwrap();

        let wrong = session.reset_password(&reset("Fresh1234", "guess")).unwrap_err();
        assert_eq!(wrong.kind(), ErrorKind::Unauthorized);

        let weak = session.reset_password(&reset("weak", "Master123")).unwrap_err();
        assert_eq!(weak.kind(), ErrorKind::Validation);

        let mut unforced = reset("Fresh1234", "Master123");
        unforced["force"] = json!(false);
        assert_eq!(
            session.reset_password(&unforced).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut ghost = reset("Fresh1234", "Master123");
        ghost["email"] = json!("ghost@x.com");
        assert_eq!(
            session.reset_password(&ghost).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let user = db.repository().fetch::<User>(&normalize("a@x.com")).unwrap();
        assert!(db.password_hasher().verify("Secret123", &user.password_hash));
    }

    #[test]
    fn reset_without_super_password_is_not_configured() {
        let db = db(None);
        let session = db.session(Principal::admin("root")).unwrap();
        let err = session.reset_password(&reset("Fresh1234", "x")).unwrap_err();
        assert!(matches!(err, CoreError::NotConfigured { .. }));
    }

    #[test]
    fn token_expiry_sums_units_and_moves_watermark() {
        let db = db(None);
        let session = db.session(Principal::admin("root")).unwrap();
        let before = db.token_policy().current();

        let policy = session
            .set_token_expiry(&json!({"access_minute": 30, "access_second": 15, "refresh_day": 7.0}))
            .unwrap();
        assert_eq!(policy.access_ttl, Duration::from_secs(30 * 60 + 15));
        assert_eq!(policy.refresh_ttl, Duration::from_secs(7 * 86_400));
        assert_eq!(policy.version, before.version + 1);
        assert!(policy.issued_after.is_some());

        let access_only = session.set_token_expiry(&json!({"access_hour": 1})).unwrap();
        assert_eq!(access_only.refresh_ttl, policy.refresh_ttl);
    }

    #[test]
    fn token_expiry_rejects_bad_input() {
        let db = db(None);
        let admin = db.session(Principal::admin("root")).unwrap();
        for body in [
            json!({"unrelated": 1}),
            json!({"access_hour": -1}),
            json!({"access_hour": 1.5}),
            json!({"access_hour": "2"}),
            json!({"refresh_second": 0}),
        ] {
            assert_eq!(
                admin.set_token_expiry(&body).unwrap_err().kind(),
                ErrorKind::Validation,
                "{body}"
            );
        }

        let user = db.session(Principal::user("a@x.com")).unwrap();
        let err = user.set_token_expiry(&json!({"access_hour": 1})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(db.token_policy().current().version, 1);
    }
}
