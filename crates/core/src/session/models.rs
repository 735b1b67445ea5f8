use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::models::RecordId;

/// Role attached to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
        }
    }

    /// Parse a stored or server-provided role. Anything other than `admin`
    /// resolves to the least privileged role.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Customer
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Role::parse).unwrap_or_default())
    }
}

/// Account representation as returned by the API.
///
/// Fields the client does not model are kept in `extra` so that the persisted
/// copy stays the server's representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, alias = "firstName")]
    pub first_name: String,
    #[serde(default, alias = "lastName")]
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl User {
    /// Name shown in the UI: full name, then username, then email.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if !full.is_empty() {
            full.to_string()
        } else if !self.username.is_empty() {
            self.username.clone()
        } else {
            self.email.clone()
        }
    }
}

/// Authenticated-identity state held for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub token: Option<String>,
    pub current_user: Option<User>,
    pub role: Option<Role>,
}

impl Session {
    pub(crate) fn with_user(token: String, user: User) -> Self {
        Self {
            token: Some(token),
            role: Some(user.role),
            current_user: Some(user),
        }
    }

    pub(crate) fn token_only(token: String) -> Self {
        Self {
            token: Some(token),
            current_user: None,
            role: None,
        }
    }

    /// True iff both a non-empty token and a current user are held.
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().map(|t| !t.is_empty()).unwrap_or(false)
            && self.current_user.is_some()
    }

    /// A token is held but the profile never resolved.
    pub fn is_degraded(&self) -> bool {
        self.token.is_some() && self.current_user.is_none()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }
}

/// Lifecycle phase of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Anonymous,
    /// A token is held. The profile may still be missing, see [`Session::is_degraded`].
    Authenticated,
}

/// Access level a screen or action requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    SignedIn,
    Admin,
}

/// Why the authorization gate refused access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// Nobody is signed in: prompt for login or registration.
    #[error("Please login or register to {action}.")]
    LoginRequired { action: String },
    /// Signed in with a role that may not enter: redirect away.
    #[error("Access denied. {required} privileges required.")]
    Forbidden { role: Role, required: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_round_trips_with_unknown_fields() {
        let raw = json!({
            "id": 4,
            "username": "asha",
            "email": "asha@example.com",
            "role": "admin",
            "firstName": "Asha",
            "last_name": "Rao",
            "phone": null,
            "date_joined": "2024-01-01"
        });
        let user: User = serde_json::from_value(raw).unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.first_name, "Asha");
        assert_eq!(user.display_name(), "Asha Rao");
        assert_eq!(user.extra.get("date_joined"), Some(&json!("2024-01-01")));

        let encoded = serde_json::to_string(&user).unwrap();
        let decoded: User = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn unknown_or_missing_roles_are_customers() {
        let user: User = serde_json::from_value(json!({"id": 1, "role": "staff"})).unwrap();
        assert_eq!(user.role, Role::Customer);
        let user: User = serde_json::from_value(json!({"id": 1, "role": null})).unwrap();
        assert_eq!(user.role, Role::Customer);
        let user: User = serde_json::from_value(json!({"id": 1, "email": "x@y.z"})).unwrap();
        assert_eq!(user.role, Role::Customer);
        assert_eq!(user.display_name(), "x@y.z");
    }

    #[test]
    fn authentication_requires_token_and_user() {
        let user: User = serde_json::from_value(json!({"id": 1})).unwrap();
        assert!(!Session::default().is_authenticated());
        assert!(!Session::token_only("t".into()).is_authenticated());
        assert!(Session::token_only("t".into()).is_degraded());
        assert!(!Session::with_user(String::new(), user.clone()).is_authenticated());
        assert!(Session::with_user("t".into(), user).is_authenticated());
    }
}
