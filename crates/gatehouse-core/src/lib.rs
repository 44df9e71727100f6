//! Core library for gatehouse.
//!
//! Everything a front end needs to sign a user in against a fastapi-users
//! style backend and call its protected API:
//!
//! - `config`: backend host, route prefix and credential model
//! - `api`: the HTTP client and its error type
//! - `auth`: session storage, OAuth callback handling and the sign-in flows
//! - `guard`: the route guard in front of protected pages
//! - `models`: backend payloads

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiBody, ApiClient, ApiError, ApiSettings};
pub use auth::{
    AuthFlow, BrowserCallback, CallbackListener, CallbackParams, Credential, Session, SessionData,
    SignedIn,
};
pub use config::{AuthMode, Config, Endpoints};
pub use guard::{GuardDecision, GuardState, Route, RouteGuard};
pub use models::User;
