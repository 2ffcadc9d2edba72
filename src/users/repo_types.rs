use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User row in the `users` table. `user_id` is an opaque text key assigned by
/// the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String, // Argon2 PHC string, never sent to clients
    pub firstname: String,
    pub lastname: String,
    pub phonenumber: String,
    pub email: String,
    pub role: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Creation payload. The password arrives in cleartext and is hashed before
/// anything is written.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewUser {
    pub username: String,
    #[serde(alias = "password_hash")]
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub phonenumber: String,
    pub email: String,
    pub role: String,
    pub status: String,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("firstname", &self.firstname)
            .field("lastname", &self.lastname)
            .field("phonenumber", &self.phonenumber)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("status", &self.status)
            .finish()
    }
}

/// Partial update. An empty string means "leave the stored value alone", so a
/// field cannot be cleared through this payload. Identity, timestamps and the
/// password are not updatable here; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpdateUser {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub phonenumber: String,
    pub email: String,
    pub role: String,
    pub status: String,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrites every field of `user` for which the patch carries a value.
    pub fn apply(self, user: &mut User) {
        fn take(slot: &mut String, value: String) {
            if !value.is_empty() {
                *slot = value;
            }
        }

        take(&mut user.username, self.username);
        take(&mut user.firstname, self.firstname);
        take(&mut user.lastname, self.lastname);
        take(&mut user.phonenumber, self.phonenumber);
        take(&mut user.email, self.email);
        take(&mut user.role, self.role);
        take(&mut user.status, self.status);
    }
}

#[cfg(test)]
pub(crate) fn sample_user() -> User {
    let now = OffsetDateTime::now_utc();
    User {
        user_id: uuid::Uuid::new_v4().to_string(),
        username: "alice".into(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        firstname: "Alice".into(),
        lastname: "Liddell".into(),
        phonenumber: "0812345678".into(),
        email: "alice@example.com".into(),
        role: "admin".into(),
        status: "active".into(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_changes_nothing() {
        let stored = sample_user();
        let mut merged = stored.clone();

        let patch = UpdateUser::default();
        assert!(patch.is_empty());
        patch.apply(&mut merged);

        assert_eq!(merged, stored);
    }

    #[test]
    fn single_field_patch_touches_only_that_field() {
        let stored = sample_user();
        let mut merged = stored.clone();

        UpdateUser {
            email: "alice@wonderland.example".into(),
            ..Default::default()
        }
        .apply(&mut merged);

        assert_eq!(merged.email, "alice@wonderland.example");
        assert_eq!(
            User {
                email: stored.email.clone(),
                ..merged
            },
            stored
        );
    }

    #[test]
    fn patch_ignores_password_and_identity_keys() {
        let patch: UpdateUser = serde_json::from_str(
            r#"{"user_id":"not-even-a-uuid","password_hash":"new","role":"viewer"}"#,
        )
        .unwrap();
        assert_eq!(
            patch,
            UpdateUser {
                role: "viewer".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn serialized_user_hides_password_hash() {
        let user = sample_user();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
        assert_eq!(json["user_id"], user.user_id.as_str());
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn new_user_accepts_legacy_password_key() {
        let payload: NewUser =
            serde_json::from_str(r#"{"username":"alice","password_hash":"pw123"}"#).unwrap();
        assert_eq!(payload.password, "pw123");
        assert!(payload.email.is_empty());
    }

    #[test]
    fn new_user_debug_redacts_password() {
        let payload = NewUser {
            username: "alice".into(),
            password: "pw123".into(),
            ..Default::default()
        };
        let rendered = format!("{payload:?}");
        assert!(!rendered.contains("pw123"));
        assert!(rendered.contains("alice"));
    }
}
