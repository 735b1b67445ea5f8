//! Boundary to the tour-booking REST API.

/// `reqwest` implementation of [`TourApi`].
pub mod http;

use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    custom::CustomPackageRequest,
    models::{
        Booking, BookingReceipt, BookingRequest, CancellationRequest, RecordId, TourDetail,
        TourListing,
    },
    session::User,
};

pub use http::HttpApi;

/// Keys that carry the bearer token in an authentication response.
const TOKEN_KEYS: [&str; 2] = ["access_token", "accessToken"];

/// Failure talking to the API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The request never reached the server or the response never arrived.
    #[error("network error: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("request rejected ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Rejected { status: u16, message: Option<String> },
    /// The server answered successfully with a body the client cannot use.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Message provided by the server, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Message to show a user: the server's own words, otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    /// The server refused the credentials attached to the request.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401 | 403, .. })
    }
}

/// Login form contents.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration form contents. Fields beyond the common ones go in `extra`.
#[derive(Clone, Default, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Partial profile update; only populated fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Update carrying only the fields whose edited text differs from
    /// `current`. Edits are trimmed; a blanked field is sent as an empty
    /// string so the server clears it.
    pub fn from_edits(
        current: &User,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone: &str,
    ) -> Self {
        fn changed(edited: &str, current: &str) -> Option<String> {
            let edited = edited.trim();
            (edited != current).then(|| edited.to_string())
        }

        Self {
            first_name: changed(first_name, &current.first_name),
            last_name: changed(last_name, &current.last_name),
            email: changed(email, &current.email),
            phone: changed(phone, current.phone.as_deref().unwrap_or("")),
        }
    }
}

/// Operations the client needs from the REST API.
#[async_trait]
pub trait TourApi: Send + Sync {
    /// Exchange credentials for an authentication payload containing a token.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Value, ApiError>;

    /// Profile of the account owning `token`.
    async fn current_user(&self, token: &str) -> Result<User, ApiError>;

    /// Create an account. The payload is opaque to the client.
    async fn register(&self, registration: &Registration) -> Result<Value, ApiError>;

    /// Apply a partial update and return the full updated representation.
    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<User, ApiError>;

    /// Public tour catalogue.
    async fn list_tours(&self) -> Result<Vec<TourListing>, ApiError>;

    /// Detail of a single tour, including its ordered pricing rows.
    async fn tour_detail(&self, tour_id: &RecordId) -> Result<TourDetail, ApiError>;

    async fn create_booking(
        &self,
        token: &str,
        request: &BookingRequest,
    ) -> Result<BookingReceipt, ApiError>;

    async fn list_bookings(&self, token: &str) -> Result<Vec<Booking>, ApiError>;

    async fn cancel_booking(
        &self,
        token: &str,
        request: &CancellationRequest,
    ) -> Result<Value, ApiError>;

    /// Ask for a tailor-made tour. Signed-in users send their token along.
    async fn request_custom_package(
        &self,
        token: Option<&str>,
        request: &CustomPackageRequest,
    ) -> Result<Value, ApiError>;
}

/// Locate a bearer token anywhere in an authentication response.
///
/// Direct keys of an object win over nested ones; empty strings do not count.
pub fn find_access_token(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => {
            let direct = TOKEN_KEYS.iter().find_map(|key| {
                map.get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
            });
            direct.or_else(|| map.values().find_map(find_access_token))
        }
        Value::Array(items) => items.iter().find_map(find_access_token),
        _ => None,
    }
}

/// Strip the `{success, message, data}` wrapper the API puts around payloads.
pub fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map)
            if map.contains_key("data")
                && (map.contains_key("success") || map.contains_key("message")) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Human-readable error text from an error response body.
pub fn error_message(body: &Value) -> Option<String> {
    let map = body.as_object()?;
    ["message", "detail", "error"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_is_found_at_any_depth() {
        let body = json!({
            "success": true,
            "data": {"user": {"id": 1}, "tokens": [{"accessToken": "deep"}]}
        });
        assert_eq!(find_access_token(&body).as_deref(), Some("deep"));

        let body = json!({"data": {"access_token": "nested"}, "access_token": "top"});
        assert_eq!(find_access_token(&body).as_deref(), Some("top"));
    }

    #[test]
    fn blank_or_missing_tokens_are_rejected() {
        assert_eq!(find_access_token(&json!({"access_token": "  "})), None);
        assert_eq!(find_access_token(&json!({"data": {"refresh": "r"}})), None);
        assert_eq!(find_access_token(&json!({"access_token": 42})), None);
        assert_eq!(find_access_token(&Value::Null), None);
    }

    #[test]
    fn envelope_is_unwrapped_only_when_present() {
        let wrapped = json!({"success": true, "message": "ok", "data": {"id": 1}});
        assert_eq!(unwrap_envelope(wrapped), json!({"id": 1}));

        let plain = json!({"id": 1, "data": "payload field"});
        assert_eq!(unwrap_envelope(plain.clone()), plain);
    }

    #[test]
    fn error_messages_prefer_message_then_detail() {
        assert_eq!(
            error_message(&json!({"message": "Invalid credentials", "detail": "x"})).as_deref(),
            Some("Invalid credentials")
        );
        assert_eq!(
            error_message(&json!({"detail": "Not found."})).as_deref(),
            Some("Not found.")
        );
        assert_eq!(error_message(&json!({"message": ""})), None);
        assert_eq!(error_message(&json!(["oops"])), None);
    }

    #[test]
    fn user_message_falls_back_for_transport_errors() {
        let err = ApiError::Transport("connection refused".into());
        assert_eq!(err.user_message("Login failed"), "Login failed");

        let err = ApiError::Rejected {
            status: 400,
            message: Some("Email already registered".into()),
        };
        assert_eq!(err.user_message("Registration failed"), "Email already registered");
        assert!(!err.is_unauthorized());
        assert!(ApiError::Rejected { status: 401, message: None }.is_unauthorized());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials::new(" a@b.com ", "hunter2");
        assert_eq!(credentials.email, "a@b.com");
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[test]
    fn profile_edits_send_only_changes_and_allow_clearing() {
        let current: User = serde_json::from_value(json!({
            "id": 3,
            "username": "zoe",
            "email": "zoe@example.com",
            "first_name": "Zoë",
            "last_name": "Ångström",
            "phone": "9876543210",
        }))
        .unwrap();

        let untouched =
            ProfileUpdate::from_edits(&current, "Zoë", " Ångström ", "zoe@example.com", "9876543210");
        assert!(untouched.is_empty());

        let update = ProfileUpdate::from_edits(&current, "Zoë", "Ångström", "zoe@example.com", "  ");
        assert_eq!(
            update,
            ProfileUpdate {
                phone: Some(String::new()),
                ..ProfileUpdate::default()
            }
        );
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"phone": ""}));
    }
}
