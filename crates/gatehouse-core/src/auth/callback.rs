//! OAuth callback handling.
//!
//! The provider sends the browser back to `/oauth-callback` carrying either an
//! access token (the redirecting bearer transport), an authorization code and
//! state to exchange with the backend, or an error. `CallbackListener` serves
//! that path on the loopback interface so a native client can receive it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

/// Path the backend redirects to after sign-in.
pub const CALLBACK_PATH: &str = "/oauth-callback";

/// How long to wait for the browser to come back.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a connection may take to send its request head.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest request head we bother reading from the browser.
const MAX_REQUEST_HEAD_BYTES: usize = 8 * 1024;

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Signed in</title></head>\
<body><h1>Sign-in received</h1>\
<p>You can close this tab and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<!doctype html><html><head><title>Sign-in failed</title></head>\
<body><h1>Sign-in failed</h1><p>Return to the terminal for details.</p></body></html>";

/// Parameters carried by an OAuth callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackParams {
    /// The backend already minted a token and passed it along.
    Token { access_token: String },
    /// An authorization code to exchange with the backend.
    Code { code: String, state: String },
    /// The provider or backend reported a failure.
    Error {
        error: String,
        description: Option<String>,
    },
    /// Nothing recognizable; a cookie session may have been set elsewhere.
    Empty,
}

impl CallbackParams {
    /// Read parameters from the query string, falling back to the fragment.
    pub fn from_url(url: &Url) -> Self {
        let params = Self::from_pairs(url.query_pairs());
        if params != CallbackParams::Empty {
            return params;
        }
        url.fragment()
            .map(|fragment| Self::from_pairs(url::form_urlencoded::parse(fragment.as_bytes())))
            .unwrap_or(CallbackParams::Empty)
    }

    /// Parse user input: a full URL, a path with query, or a bare query string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Ok(url) = Url::parse(input) {
            return Ok(Self::from_url(&url));
        }

        let base = Url::parse("http://localhost/").context("Failed to build base URL")?;
        let url = if input.starts_with('/') || input.starts_with('?') || input.starts_with('#') {
            base.join(input)
        } else {
            base.join(&format!("?{}", input))
        }
        .with_context(|| format!("Could not parse callback URL '{}'", input))?;

        Ok(Self::from_url(&url))
    }

    /// Parse a `Location` header, which may be absolute or relative.
    pub fn from_location(location: &str) -> Self {
        Self::parse(location).unwrap_or(CallbackParams::Empty)
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        let mut map: HashMap<String, String> = pairs
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        if let Some(error) = map.remove("error") {
            return CallbackParams::Error {
                error,
                description: map.remove("error_description"),
            };
        }

        if let Some(access_token) = map.remove("access_token") {
            return CallbackParams::Token { access_token };
        }

        match (map.remove("code"), map.remove("state")) {
            (Some(code), Some(state)) => CallbackParams::Code { code, state },
            (Some(_), None) => CallbackParams::Error {
                error: "invalid_callback".to_string(),
                description: Some("authorization code returned without state".to_string()),
            },
            _ => CallbackParams::Empty,
        }
    }

    /// Human-readable failure text for `Error` params.
    pub fn error_message(&self) -> Option<String> {
        match self {
            CallbackParams::Error { error, description } => Some(match description {
                Some(desc) => format!("{} ({})", desc, error),
                None => error.clone(),
            }),
            _ => None,
        }
    }
}

/// What the browser brought back to the loopback listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCallback {
    pub params: CallbackParams,
    /// The request's `Cookie` header. Cookies are scoped by host, so a
    /// backend on localhost that set its session cookie shows up here.
    pub cookie: Option<String>,
}

/// One-shot HTTP listener for the OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind on 127.0.0.1. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("Failed to listen for the OAuth callback on port {}", port))?;
        let port = listener.local_addr()?.port();
        debug!(port, "OAuth callback listener bound");
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, CALLBACK_PATH)
    }

    /// Serve requests until one hits the callback path, then return what it
    /// carried. Consumes the listener.
    pub async fn wait(self, timeout: Duration) -> Result<BrowserCallback> {
        match tokio::time::timeout(timeout, self.accept_callback()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "Timed out after {}s waiting for the browser to return",
                timeout.as_secs()
            )),
        }
    }

    /// Each connection is served in its own task so an idle preconnect
    /// socket cannot hold up the real callback.
    async fn accept_callback(&self) -> Result<BrowserCallback> {
        let (tx, mut rx) = mpsc::channel(1);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) =
                        accepted.context("Failed to accept OAuth callback connection")?;
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(callback) = serve_connection(stream, peer).await {
                            let _ = tx.send(callback).await;
                        }
                    });
                }
                Some(callback) = rx.recv() => {
                    info!(with_cookie = callback.cookie.is_some(), "OAuth callback received");
                    return Ok(callback);
                }
            }
        }
    }
}

/// Answer one connection. Returns the callback if this request was it.
async fn serve_connection(mut stream: TcpStream, peer: SocketAddr) -> Option<BrowserCallback> {
    let head = match tokio::time::timeout(REQUEST_HEAD_TIMEOUT, read_request_head(&mut stream))
        .await
    {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => {
            write_response(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
            return None;
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "Dropped unreadable callback connection");
            return None;
        }
        Err(_) => {
            debug!(%peer, "Closed idle callback connection");
            return None;
        }
    };

    let url = match Url::parse("http://localhost/").and_then(|base| base.join(&head.target)) {
        Ok(url) => url,
        Err(_) => {
            write_response(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
            return None;
        }
    };

    if url.path() != CALLBACK_PATH {
        debug!(path = url.path(), "Ignoring request outside the callback path");
        write_response(&mut stream, "404 Not Found", "").await;
        return None;
    }

    let params = CallbackParams::from_url(&url);
    let page = match params {
        CallbackParams::Error { .. } => FAILURE_PAGE,
        _ => SUCCESS_PAGE,
    };
    write_response(&mut stream, "200 OK", page).await;
    Some(BrowserCallback {
        params,
        cookie: head.cookie,
    })
}

/// The parts of a GET request head the listener cares about.
#[derive(Debug)]
struct RequestHead {
    target: String,
    cookie: Option<String>,
}

/// Read the request head. `None` when it is not a GET.
async fn read_request_head(stream: &mut TcpStream) -> Result<Option<RequestHead>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        let complete = buffer.windows(4).any(|w| w == b"\r\n\r\n");
        if complete || buffer.len() >= MAX_REQUEST_HEAD_BYTES {
            break;
        }
    }

    Ok(parse_request_head(&String::from_utf8_lossy(&buffer)))
}

fn parse_request_head(head: &str) -> Option<RequestHead> {
    let mut lines = head.lines();
    let mut parts = lines.next()?.split_whitespace();
    let target = match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => target.to_string(),
        _ => return None,
    };

    let cookies: Vec<&str> = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case("cookie"))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    Some(RequestHead {
        target,
        cookie: (!cookies.is_empty()).then(|| cookies.join("; ")),
    })
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to write callback response");
    }
    let _ = stream.shutdown().await;
}
