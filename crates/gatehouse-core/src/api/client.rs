//! API client for the authentication backend.
//!
//! `ApiClient` forwards requests to the configured backend host, attaching
//! the bearer token when one is set and replaying cookies from its jar on
//! every request. Each call is a single attempt: no retry, no backoff.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::CallbackParams;
use crate::config::Endpoints;
use crate::models::{AuthorizeResponse, TokenResponse, User};

use super::ApiError;

/// Where the client sends its requests.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub endpoints: Endpoints,
}

/// Request body variants.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Per-request options. `Default` is a plain GET.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self {
            method: Method::POST,
            ..Self::default()
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = Some(RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self
    }
}

/// A decoded 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    Json(Value),
    Text(String),
}

impl ApiBody {
    /// Text verbatim, JSON compact-serialized.
    pub fn display_string(&self) -> String {
        match self {
            ApiBody::Json(value) => value.to_string(),
            ApiBody::Text(text) => text.clone(),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiBody::Json(value) => Some(value),
            ApiBody::Text(_) => None,
        }
    }
}

impl fmt::Display for ApiBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

/// What a successful login or code exchange left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The backend handed over a bearer token.
    Token(String),
    /// The backend set its session cookie; the jar now holds it.
    Cookie,
}

/// API client for the authentication backend.
/// Clone is cheap - reqwest::Client and the cookie jar are shared via Arc.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    /// Same jar, redirects disabled; used where the `Location` header matters.
    no_redirect: Client,
    jar: Arc<Jar>,
    base_url: Url,
    endpoints: Arc<Endpoints>,
    token: Option<Arc<String>>,
}

fn build_clients(jar: &Arc<Jar>) -> Result<(Client, Client)> {
    let client = Client::builder()
        .cookie_provider(Arc::clone(jar))
        .build()
        .context("Failed to build HTTP client")?;
    let no_redirect = Client::builder()
        .cookie_provider(Arc::clone(jar))
        .redirect(redirect::Policy::none())
        .build()
        .context("Failed to build HTTP client")?;
    Ok((client, no_redirect))
}

impl ApiClient {
    /// Create a new API client
    pub fn new(settings: ApiSettings) -> Result<Self> {
        let base = settings.base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(base)
            .with_context(|| format!("Invalid API base URL '{}'", settings.base_url))?;

        let jar = Arc::new(Jar::default());
        let (client, no_redirect) = build_clients(&jar)?;

        Ok(Self {
            client,
            no_redirect,
            jar,
            base_url,
            endpoints: Arc::new(settings.endpoints),
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: impl Into<Arc<String>>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(String::as_str)
    }

    /// Create a new ApiClient with the given token, sharing the connection
    /// pool and the cookie jar.
    pub fn with_token(&self, token: impl Into<Arc<String>>) -> Self {
        let mut api = self.clone();
        api.set_token(token);
        api
    }

    // ===== Cookie jar =====

    /// Snapshot of the `Cookie` header the jar would send to the backend.
    /// The value is stored and replayed as-is, never parsed.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
            .filter(|value| !value.is_empty())
    }

    /// Seed the jar with a previously captured `Cookie` header.
    pub fn restore_cookie(&self, cookie_header: &str) {
        for pair in cookie_header.split(';') {
            let pair = pair.trim();
            if !pair.is_empty() {
                self.jar.add_cookie_str(pair, &self.base_url);
            }
        }
    }

    /// Drop every cookie by swapping in a fresh jar.
    pub fn reset_cookies(&mut self) -> Result<()> {
        let jar = Arc::new(Jar::default());
        let (client, no_redirect) = build_clients(&jar)?;
        self.jar = jar;
        self.client = client;
        self.no_redirect = no_redirect;
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        self.token.is_some() || self.cookie_header().is_some()
    }

    // ===== Request plumbing =====

    /// Join the base URL and a path, adding the leading slash if missing.
    pub fn url(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Url::parse(&joined).with_context(|| format!("Invalid request URL '{}'", joined))
    }

    /// Default headers for a request. JSON is the default content type; form
    /// bodies keep the urlencoded type reqwest gives them.
    fn request_headers(&self, extra: &HeaderMap, body: Option<&RequestBody>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !matches!(body, Some(RequestBody::Form(_))) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        for (name, value) in extra.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Bearer token contains invalid header characters")?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn decode_body(response: reqwest::Response) -> Result<ApiBody> {
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let text = response.text().await.context("Failed to read response body")?;

        if is_json && !text.trim().is_empty() {
            let value = serde_json::from_str(&text)
                .map_err(|e| ApiError::InvalidResponse(format!("malformed JSON: {}", e)))?;
            Ok(ApiBody::Json(value))
        } else {
            Ok(ApiBody::Text(text))
        }
    }

    /// Send one request and decode the response.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<ApiBody> {
        let url = self.url(path)?;
        let method = options.method.clone();
        let headers = self.request_headers(&options.headers, options.body.as_ref())?;

        let mut builder = self.client.request(method.clone(), url.clone()).headers(headers);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        builder = match options.body {
            Some(RequestBody::Json(ref body)) => builder.json(body),
            Some(RequestBody::Form(ref fields)) => builder.form(fields),
            None => builder,
        };

        debug!(%method, %url, bearer = self.token.is_some(), "Sending request");

        let response = builder
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send {} request to {}", method, url))?;

        let response = Self::check_response(response).await?;
        Self::decode_body(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = match self.request(path, RequestOptions::get()).await? {
            ApiBody::Json(value) => value,
            // Some backends omit the JSON content type
            ApiBody::Text(text) => serde_json::from_str(&text).map_err(|_| {
                ApiError::InvalidResponse(format!("expected JSON from {}", path))
            })?,
        };
        serde_json::from_value(value).map_err(|e| {
            ApiError::InvalidResponse(format!("unexpected payload from {}: {}", path, e)).into()
        })
    }

    // ===== Endpoints =====

    /// Fetch the signed-in user. Doubles as the "am I logged in" probe.
    pub async fn current_user(&self) -> Result<User> {
        self.get_json(&self.endpoints.current_user).await
    }

    /// Ask the backend where to send the browser for Google sign-in.
    pub async fn authorization_url(&self, redirect_url: &str) -> Result<Url> {
        let body = self
            .request(
                &self.endpoints.authorize,
                RequestOptions::get().query("redirect_url", redirect_url),
            )
            .await
            .context("Failed to initiate OAuth")?;

        let response: AuthorizeResponse = match body {
            ApiBody::Json(value) => serde_json::from_value(value)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))?,
            ApiBody::Text(_) => return Err(ApiError::MissingField("authorization_url").into()),
        };

        let url = response
            .authorization_url
            .filter(|u| !u.trim().is_empty())
            .ok_or(ApiError::MissingField("authorization_url"))?;

        Url::parse(&url)
            .with_context(|| format!("Backend returned an invalid authorization URL '{}'", url))
    }

    /// Trade an authorization code + state for a credential.
    ///
    /// Sent with redirects disabled: a backend that answers with a redirect
    /// either carries the token in `Location` or has just set its cookie.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<ExchangeOutcome> {
        let url = self.url(&self.endpoints.callback)?;
        debug!(%url, "Exchanging authorization code");

        let response = self
            .no_redirect
            .get(url.clone())
            .query(&[("code", code), ("state", state)])
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send OAuth callback request to {}", url))?;

        if response.status().is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            debug!(status = %response.status(), ?location, "OAuth callback redirected");

            return match location.as_deref().map(CallbackParams::from_location) {
                Some(CallbackParams::Token { access_token }) => {
                    Ok(ExchangeOutcome::Token(access_token))
                }
                Some(CallbackParams::Error { error, description }) => Err(ApiError::Callback(
                    description.unwrap_or(error),
                )
                .into()),
                _ => Ok(ExchangeOutcome::Cookie),
            };
        }

        let response = Self::check_response(response).await?;
        Ok(Self::outcome_from_body(Self::decode_body(response).await?))
    }

    /// Username/password login against the cookie transport.
    pub async fn login_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ExchangeOutcome> {
        let body = self
            .request(
                &self.endpoints.cookie_login,
                RequestOptions::post().form(&[("username", username), ("password", password)]),
            )
            .await
            .context("Login failed")?;
        Ok(Self::outcome_from_body(body))
    }

    /// Ask the backend to invalidate the cookie session.
    pub async fn logout_remote(&self) -> Result<()> {
        self.request(&self.endpoints.cookie_logout, RequestOptions::post())
            .await
            .context("Logout request failed")?;
        Ok(())
    }

    /// Call the example protected resource.
    pub async fn call_protected(&self) -> Result<ApiBody> {
        self.request(&self.endpoints.protected, RequestOptions::get()).await
    }

    fn outcome_from_body(body: ApiBody) -> ExchangeOutcome {
        let token = body
            .as_json()
            .and_then(|v| serde_json::from_value::<TokenResponse>(v.clone()).ok());
        match token {
            Some(token) if !token.access_token.is_empty() => {
                debug!(token_type = ?token.token_type, "Backend returned an access token");
                ExchangeOutcome::Token(token.access_token)
            }
            Some(_) => {
                warn!("Backend returned an empty access_token, falling back to cookie session");
                ExchangeOutcome::Cookie
            }
            None => ExchangeOutcome::Cookie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(ApiSettings {
            base_url: base.to_string(),
            endpoints: Endpoints::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let api = client("http://localhost:8000");
        assert_eq!(api.url("/users/me").unwrap().as_str(), "http://localhost:8000/users/me");
        assert_eq!(api.url("users/me").unwrap().as_str(), "http://localhost:8000/users/me");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let api = client("https://example.com/backend/");
        assert_eq!(
            api.url("/api/v1/users/me").unwrap().as_str(),
            "https://example.com/backend/api/v1/users/me"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = ApiClient::new(ApiSettings {
            base_url: "not a url".to_string(),
            endpoints: Endpoints::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_token_header_attached() {
        let api = client("http://localhost:8000").with_token("abc".to_string());
        let headers = api.request_headers(&HeaderMap::new(), None).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_no_token_no_header() {
        let api = client("http://localhost:8000");
        let headers = api.request_headers(&HeaderMap::new(), None).unwrap();
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_caller_headers_override_defaults() {
        let api = client("http://localhost:8000");
        let mut extra = HeaderMap::new();
        extra.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let headers = api.request_headers(&extra, None).unwrap();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_form_body_skips_json_content_type() {
        let api = client("http://localhost:8000");
        let form = RequestBody::Form(vec![("username".to_string(), "u".to_string())]);
        let headers = api.request_headers(&HeaderMap::new(), Some(&form)).unwrap();
        assert!(headers.get(header::CONTENT_TYPE).is_none());

        let json = RequestBody::Json(serde_json::json!({}));
        let headers = api.request_headers(&HeaderMap::new(), Some(&json)).unwrap();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_cookie_restore_and_reset() {
        let mut api = client("http://localhost:8000");
        assert!(api.cookie_header().is_none());
        assert!(!api.has_credential());

        api.restore_cookie("access_token=opaque-value");
        assert_eq!(api.cookie_header().as_deref(), Some("access_token=opaque-value"));
        assert!(api.has_credential());

        // Clones share the jar
        let clone = api.clone();
        assert!(clone.cookie_header().is_some());

        api.reset_cookies().unwrap();
        assert!(api.cookie_header().is_none());
    }

    #[test]
    fn test_outcome_from_body() {
        let token =
            ApiBody::Json(serde_json::json!({"access_token": "t1", "token_type": "bearer"}));
        assert_eq!(ApiClient::outcome_from_body(token), ExchangeOutcome::Token("t1".to_string()));
        assert_eq!(
            ApiClient::outcome_from_body(ApiBody::Text(String::new())),
            ExchangeOutcome::Cookie
        );
    }

    #[test]
    fn test_api_body_display() {
        assert_eq!(ApiBody::Text("hi".to_string()).display_string(), "hi");
        assert_eq!(
            ApiBody::Json(serde_json::json!({"message": "Hello a@b.c!"})).display_string(),
            r#"{"message":"Hello a@b.c!"}"#
        );
    }
}
