//! Data models for backend payloads.
//!
//! - `User`: the profile returned by the current-user endpoint
//! - `AuthorizeResponse`: the OAuth authorize endpoint's reply
//! - `TokenResponse`: a bearer login/exchange reply

pub mod user;

pub use user::{AuthorizeResponse, TokenResponse, User};
