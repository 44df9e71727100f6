//! Integration tests for the API client against a mock backend.

use gatehouse_core::api::{ApiBody, ApiClient, ApiError, ApiSettings, RequestOptions};
use gatehouse_core::config::Endpoints;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(ApiSettings {
        base_url: server.uri(),
        endpoints: Endpoints::default(),
    })
    .unwrap()
}

fn user_json(email: &str) -> serde_json::Value {
    json!({
        "id": "0b9c2f5e-1111-4222-8333-944455556666",
        "email": email,
        "is_active": true,
        "is_superuser": false,
        "is_verified": true
    })
}

#[tokio::test]
async fn test_bearer_token_is_attached_when_present() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("user@example.com")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server).with_token("tok-123".to_string());
    let user = api.current_user().await.unwrap();
    assert_eq!(user.email, "user@example.com");
}

#[tokio::test]
async fn test_no_authorization_header_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/authenticated-route"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "hi"})))
        .mount(&server)
        .await;

    let api = client_for(&server);
    api.call_protected().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_non_2xx_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Unauthorized"})))
        .mount(&server)
        .await;

    let err = client_for(&server).current_user().await.unwrap_err();
    let api_err = err.downcast_ref::<ApiError>().expect("should be an ApiError");
    assert_eq!(api_err.status(), Some(401));
    assert!(api_err.is_unauthorized());
    assert_eq!(err.to_string(), r#"API 401: {"detail":"Unauthorized"}"#);
}

#[tokio::test]
async fn test_empty_error_body_uses_reason_phrase() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/authenticated-route"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client_for(&server).call_protected().await.unwrap_err();
    assert_eq!(err.to_string(), "API 500: Internal Server Error");
}

#[tokio::test]
async fn test_json_and_text_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/authenticated-route"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Hello user@example.com!"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let api = client_for(&server);

    let body = api.call_protected().await.unwrap();
    assert_eq!(body.as_json().unwrap()["message"], "Hello user@example.com!");
    assert_eq!(body.display_string(), r#"{"message":"Hello user@example.com!"}"#);

    // Leading slash is optional
    let body = api.request("plain", RequestOptions::get()).await.unwrap();
    assert_eq!(body, ApiBody::Text("pong".to_string()));
}

#[tokio::test]
async fn test_cookie_set_by_backend_is_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/cookie/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=user%40example.com"))
        .respond_with(
            ResponseTemplate::new(204)
                .insert_header(
                    "set-cookie",
                    "access_token=cookie-abc; HttpOnly; Path=/; SameSite=lax",
                ),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .and(header("cookie", "access_token=cookie-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("user@example.com")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    api.login_with_password("user@example.com", "password123")
        .await
        .unwrap();
    assert_eq!(api.cookie_header().as_deref(), Some("access_token=cookie-abc"));

    let user = api.current_user().await.unwrap();
    assert_eq!(user.email, "user@example.com");
}

#[tokio::test]
async fn test_authorization_url_sends_redirect_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/google/authorize"))
        .and(query_param("redirect_url", "http://localhost:5173/oauth-callback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authorization_url": "https://accounts.google.com/o/oauth2/v2/auth?client_id=x&state=s"
        })))
        .mount(&server)
        .await;

    let url = client_for(&server)
        .authorization_url("http://localhost:5173/oauth-callback")
        .await
        .unwrap();
    assert_eq!(url.host_str(), Some("accounts.google.com"));
}

#[tokio::test]
async fn test_authorization_url_missing_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/google/authorize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .authorization_url("http://localhost:5173/oauth-callback")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "authorization_url not returned by backend");
}

#[tokio::test]
async fn test_authorize_failure_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/google/authorize"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .authorization_url("http://localhost:5173/oauth-callback")
        .await
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.starts_with("Failed to initiate OAuth"));
    assert!(message.contains("API 503: maintenance"));
}

#[tokio::test]
async fn test_network_failure_is_an_error() {
    // Grab a free port and release it so nothing is listening there
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let api = ApiClient::new(ApiSettings {
        base_url: format!("http://127.0.0.1:{}", port),
        endpoints: Endpoints::default(),
    })
    .unwrap();

    let err = api.current_user().await.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to send GET request"));
}

#[tokio::test]
async fn test_unprefixed_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("bare@example.com")))
        .mount(&server)
        .await;

    let api = ApiClient::new(ApiSettings {
        base_url: server.uri(),
        endpoints: Endpoints::with_prefix(""),
    })
    .unwrap();
    assert_eq!(api.current_user().await.unwrap().email, "bare@example.com");
}

#[tokio::test]
async fn test_integer_user_id_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/me"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": 42, "email": "int@example.com"})),
        )
        .mount(&server)
        .await;

    let user = client_for(&server).current_user().await.unwrap();
    assert_eq!(user.email, "int@example.com");
    assert_eq!(user.id_display().as_deref(), Some("42"));
}
