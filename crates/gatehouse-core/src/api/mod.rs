//! REST API client module for the authentication backend.
//!
//! This module provides the `ApiClient` for the current-user probe, the OAuth
//! authorize/callback pair, cookie login/logout and the protected example
//! route.
//!
//! Requests carry a bearer token when one is set and always replay cookies.

pub mod client;
pub mod error;

pub use client::{ApiBody, ApiClient, ApiSettings, ExchangeOutcome, RequestBody, RequestOptions};
pub use error::ApiError;
