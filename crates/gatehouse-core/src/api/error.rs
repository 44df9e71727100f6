use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Any non-2xx response. The message is the body text, or the reason
    /// phrase when the body was empty.
    #[error("API {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0} not returned by backend")]
    MissingField(&'static str),

    #[error("OAuth callback failed: {0}")]
    Callback(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("Unknown status").to_string()
        } else {
            Self::truncate_body(body)
        };
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }

    /// HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_uses_body() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"detail":"Unauthorized"}"#);
        assert_eq!(err.to_string(), r#"API 401: {"detail":"Unauthorized"}"#);
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_from_status_empty_body_uses_reason() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "  ");
        assert_eq!(err.to_string(), "API 502: Bad Gateway");
        assert_eq!(err.status(), Some(502));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(2000);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let message = err.to_string();
        assert!(message.contains("truncated, 2000 total bytes"));
        assert!(message.len() < 600);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 'é' is two bytes, so byte 500 falls inside a character
        let body = format!("a{}", "é".repeat(400));
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with('a'));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_missing_field_message() {
        let err = ApiError::MissingField("authorization_url");
        assert_eq!(err.to_string(), "authorization_url not returned by backend");
    }
}
