//! Sign-in and sign-out flows.
//!
//! `AuthFlow` owns an `ApiClient` and turns backend replies into a
//! `SessionData` the caller persists. It never touches the session file on
//! its own except in `logout`, where clearing it is the point.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{ApiClient, ApiError, ExchangeOutcome};
use crate::config::AuthMode;
use crate::models::User;

use super::callback::{BrowserCallback, CallbackParams};
use super::session::{Credential, Session, SessionData};

/// A freshly established session together with the profile that proved it.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: SessionData,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthFlow {
    api: ApiClient,
    mode: AuthMode,
}

impl AuthFlow {
    pub fn new(api: ApiClient, mode: AuthMode) -> Self {
        Self { api, mode }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Attach a stored credential so later requests carry it.
    pub fn attach(&mut self, credential: &Credential) {
        match credential {
            Credential::Bearer { token } => self.api.set_token(token.clone()),
            Credential::Cookie { cookie } => self.api.restore_cookie(cookie),
        }
    }

    /// Re-attach whatever credential the session holds.
    pub fn restore(&mut self, session: &Session) {
        if let Some(credential) = session.credential() {
            debug!(kind = credential.kind(), "Restoring stored credential");
            self.attach(credential);
        }
    }

    /// Ask the backend for the provider's authorization URL.
    pub async fn begin_oauth(&self, redirect_url: &str) -> Result<Url> {
        info!(redirect_url, "Starting Google OAuth");
        self.api.authorization_url(redirect_url).await
    }

    /// Finish a sign-in the loopback listener received. Cookies the browser
    /// sent along are seeded into the jar first, so a backend that set its
    /// session cookie before redirecting is seen by the probe.
    pub async fn complete_browser_callback(&self, callback: BrowserCallback) -> Result<SignedIn> {
        if let Some(ref cookie) = callback.cookie {
            if !matches!(callback.params, CallbackParams::Token { .. }) {
                debug!("Seeding cookies the browser sent with the callback");
                self.api.restore_cookie(cookie);
            }
        }
        self.complete_callback(callback.params).await
    }

    /// Turn callback parameters into a verified session.
    pub async fn complete_callback(&self, params: CallbackParams) -> Result<SignedIn> {
        let failure = params.error_message();
        let api = match params {
            CallbackParams::Token { access_token } => {
                debug!("Callback carried an access token");
                self.api.with_token(access_token)
            }
            CallbackParams::Code { code, state } => {
                match self
                    .api
                    .exchange_code(&code, &state)
                    .await
                    .context("Failed to exchange authorization code")?
                {
                    ExchangeOutcome::Token(token) => self.api.with_token(token),
                    ExchangeOutcome::Cookie => self.api.clone(),
                }
            }
            CallbackParams::Error { .. } => {
                return Err(ApiError::Callback(failure.unwrap_or_default()).into());
            }
            CallbackParams::Empty => {
                // The backend may have set a cookie on its own redirect
                debug!("Callback carried no parameters, probing for an existing session");
                self.api.clone()
            }
        };

        Self::verify(&api)
            .await
            .map_err(|e| anyhow::anyhow!("Login failed or session not found. {:#}", e))
    }

    /// Username/password login against the cookie transport.
    pub async fn login_with_password(&self, username: &str, password: &str) -> Result<SignedIn> {
        let api = match self.api.login_with_password(username, password).await? {
            ExchangeOutcome::Token(token) => self.api.with_token(token),
            ExchangeOutcome::Cookie => self.api.clone(),
        };
        Self::verify(&api).await.context("Login failed")
    }

    /// Probe the current user with the client's credential and package the
    /// credential for storage.
    async fn verify(api: &ApiClient) -> Result<SignedIn> {
        let user = api.current_user().await?;

        let credential = match api.token() {
            Some(token) => Credential::Bearer {
                token: token.to_string(),
            },
            None => {
                let cookie = api.cookie_header().unwrap_or_else(|| {
                    warn!("Session verified but no cookie is visible for the API host");
                    String::new()
                });
                Credential::Cookie { cookie }
            }
        };

        info!(email = %user.email, kind = credential.kind(), "Signed in");
        Ok(SignedIn {
            session: SessionData::new(credential, Some(user.email.clone())),
            user,
        })
    }

    pub async fn current_user(&self) -> Result<User> {
        self.api.current_user().await
    }

    /// Whether logging out involves the backend's cookie logout endpoint.
    pub fn needs_remote_logout(&self, session: &Session) -> bool {
        self.mode == AuthMode::Cookie
            || matches!(session.credential(), Some(Credential::Cookie { .. }))
    }

    /// Drop the local credential: session file, token and cookie jar.
    pub fn clear_local(&mut self, session: &mut Session) -> Result<()> {
        let cleared = session.clear();
        self.api.clear_token();
        self.api.reset_cookies()?;
        cleared.context("Failed to remove session file")
    }

    /// Log out: tell the backend when a cookie session is involved (failures
    /// are ignored), then clear the local credential.
    pub async fn logout(&mut self, session: &mut Session) -> Result<()> {
        if self.needs_remote_logout(session) {
            if let Err(e) = self.api.logout_remote().await {
                warn!(
                    error = %format!("{:#}", e),
                    "Backend logout failed, clearing local session anyway"
                );
            }
        }
        self.clear_local(session)?;
        info!("Logged out");
        Ok(())
    }
}
