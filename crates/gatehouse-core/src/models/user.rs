use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile of the signed-in user, as served by `GET /users/me`.
///
/// Only `email` is required; the flags default to false so that a backend
/// returning a trimmed-down profile still decodes. `id` is kept as raw JSON
/// since backends differ between UUID strings and integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<Value>,
    pub email: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_verified: bool,
}

impl User {
    /// The id as text, without JSON quoting for string ids.
    pub fn id_display(&self) -> Option<String> {
        self.id.as_ref().map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn welcome_message(&self) -> String {
        format!("Welcome, {}!", self.email)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    #[serde(default)]
    pub authorization_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_decodes_fastapi_users_profile() {
        let json = r#"{
            "id": "5f0c1a2e-8a8e-4a8e-9c1b-3d2f1e0a9b7c",
            "email": "user@example.com",
            "is_active": true,
            "is_superuser": false,
            "is_verified": true
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.email, "user@example.com");
        assert!(user.is_active);
        assert!(user.is_verified);
        assert_eq!(user.welcome_message(), "Welcome, user@example.com!");
        assert_eq!(
            user.id_display().as_deref(),
            Some("5f0c1a2e-8a8e-4a8e-9c1b-3d2f1e0a9b7c")
        );
    }

    #[test]
    fn test_user_with_integer_id() {
        let user: User =
            serde_json::from_str(r#"{"id": 42, "email": "user@example.com"}"#).unwrap();
        assert_eq!(user.id_display().as_deref(), Some("42"));
    }

    #[test]
    fn test_user_minimal_profile() {
        let user: User = serde_json::from_str(r#"{"email":"a@b.c","extra":1}"#).unwrap();
        assert_eq!(user.id, None);
        assert!(!user.is_superuser);
    }

    #[test]
    fn test_authorize_response_without_url() {
        let resp: AuthorizeResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.authorization_url.is_none());
    }
}
