//! Route guarding.
//!
//! A guarded page starts in `Loading`, issues a "who am I" probe on mount,
//! and either renders (`Authenticated`) or sends the user to Login with the
//! guarded route remembered for afterwards. Decisions are never cached: a
//! fresh `RouteGuard` is mounted for every navigation.

use std::fmt;

use tracing::debug;

use crate::config::AuthMode;
use crate::models::User;

/// Pages of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    OAuthCallback,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::OAuthCallback => "/oauth-callback",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "" => Some(Route::Home),
            "/login" => Some(Route::Login),
            "/oauth-callback" => Some(Route::OAuthCallback),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Login => "Login",
            Route::OAuthCallback => "OAuth Callback",
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Home)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Authenticated(User),
    Unauthenticated,
}

/// What the page should do with the guard's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Probe still in flight.
    Wait,
    Render(User),
    Redirect { to: Route, from: Route },
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    route: Route,
    state: GuardState,
}

impl RouteGuard {
    pub fn mount(route: Route) -> Self {
        Self {
            route,
            state: GuardState::Loading,
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    /// Whether a probe must be sent. Bearer mode without a token fails
    /// immediately, as there is nothing the backend could accept.
    pub fn needs_probe(&mut self, mode: AuthMode, has_credential: bool) -> bool {
        if mode == AuthMode::Bearer && !has_credential {
            debug!(route = %self.route, "No bearer token, skipping probe");
            self.state = GuardState::Unauthenticated;
            return false;
        }
        true
    }

    /// Feed the probe outcome. Any failure counts as unauthenticated.
    pub fn resolve<E>(&mut self, probe: Result<User, E>) -> GuardDecision {
        self.state = match probe {
            Ok(user) => GuardState::Authenticated(user),
            Err(_) => GuardState::Unauthenticated,
        };
        self.decision()
    }

    pub fn decision(&self) -> GuardDecision {
        match self.state {
            GuardState::Loading => GuardDecision::Wait,
            GuardState::Authenticated(ref user) => GuardDecision::Render(user.clone()),
            GuardState::Unauthenticated => GuardDecision::Redirect {
                to: Route::Login,
                from: self.route,
            },
        }
    }
}

/// Where to go after a successful sign-in.
pub fn post_login_destination(from: Option<Route>) -> Route {
    match from {
        Some(route) if route.requires_auth() => route,
        _ => Route::Home,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: None,
            email: "user@example.com".to_string(),
            is_active: true,
            is_superuser: false,
            is_verified: true,
        }
    }

    #[test]
    fn test_guard_starts_loading() {
        let guard = RouteGuard::mount(Route::Home);
        assert_eq!(guard.state(), &GuardState::Loading);
        assert_eq!(guard.decision(), GuardDecision::Wait);
    }

    #[test]
    fn test_successful_probe_renders() {
        let mut guard = RouteGuard::mount(Route::Home);
        let decision = guard.resolve::<String>(Ok(user()));
        assert_eq!(decision, GuardDecision::Render(user()));
    }

    #[test]
    fn test_failed_probe_redirects_with_origin() {
        let mut guard = RouteGuard::mount(Route::Home);
        let decision = guard.resolve(Err("API 401: Unauthorized"));
        assert_eq!(
            decision,
            GuardDecision::Redirect {
                to: Route::Login,
                from: Route::Home
            }
        );
    }

    #[test]
    fn test_bearer_without_token_skips_probe() {
        let mut guard = RouteGuard::mount(Route::Home);
        assert!(!guard.needs_probe(AuthMode::Bearer, false));
        assert!(matches!(guard.decision(), GuardDecision::Redirect { .. }));

        let mut guard = RouteGuard::mount(Route::Home);
        assert!(guard.needs_probe(AuthMode::Bearer, true));
        // Cookie mode always probes: the client cannot see an HttpOnly cookie
        let mut guard2 = RouteGuard::mount(Route::Home);
        assert!(guard2.needs_probe(AuthMode::Cookie, false));
        assert_eq!(guard.decision(), GuardDecision::Wait);
    }

    #[test]
    fn test_route_paths() {
        assert_eq!(Route::from_path("/"), Some(Route::Home));
        assert_eq!(Route::from_path("/login/"), Some(Route::Login));
        assert_eq!(Route::from_path("/oauth-callback"), Some(Route::OAuthCallback));
        assert_eq!(Route::from_path("/admin"), None);
        assert!(Route::Home.requires_auth());
        assert!(!Route::Login.requires_auth());
    }

    #[test]
    fn test_post_login_destination() {
        assert_eq!(post_login_destination(Some(Route::Home)), Route::Home);
        assert_eq!(post_login_destination(Some(Route::Login)), Route::Home);
        assert_eq!(post_login_destination(None), Route::Home);
    }
}
