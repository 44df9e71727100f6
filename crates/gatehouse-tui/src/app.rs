//! Application state management for the Gatehouse TUI.
//!
//! This module contains the core `App` struct: the current page, its route
//! guard, the login form, and the channel that carries background task
//! results back to the UI loop.
//!
//! Every navigation bumps a mount generation. Background work is tagged with
//! the generation it was started under, and results that arrive after the
//! page was left are dropped without touching state.

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use gatehouse_core::api::{ApiBody, ApiClient, ApiSettings};
use gatehouse_core::auth::{
    AuthFlow, CallbackListener, CredentialStore, Session, SignedIn, DEFAULT_CALLBACK_TIMEOUT,
};
use gatehouse_core::config::{AuthMode, Config};
use gatehouse_core::guard::{post_login_destination, GuardDecision, Route, RouteGuard};
use gatehouse_core::models::User;

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for username input.
const MAX_USERNAME_LENGTH: usize = 254;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

const STATUS_PROCESSING: &str = "Processing login...";

// ============================================================================
// UI State Types
// ============================================================================

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Login page focus. The username/password fields only exist in cookie mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFocus {
    Google,
    Username,
    Password,
    Button,
}

impl LoginFocus {
    pub fn next(&self, with_form: bool) -> Self {
        if !with_form {
            return LoginFocus::Google;
        }
        match self {
            LoginFocus::Google => LoginFocus::Username,
            LoginFocus::Username => LoginFocus::Password,
            LoginFocus::Password => LoginFocus::Button,
            LoginFocus::Button => LoginFocus::Google,
        }
    }

    pub fn prev(&self, with_form: bool) -> Self {
        if !with_form {
            return LoginFocus::Google;
        }
        match self {
            LoginFocus::Google => LoginFocus::Button,
            LoginFocus::Username => LoginFocus::Google,
            LoginFocus::Password => LoginFocus::Username,
            LoginFocus::Button => LoginFocus::Password,
        }
    }

    /// Whether typed characters go into a text field.
    pub fn is_text_field(&self) -> bool {
        matches!(self, LoginFocus::Username | LoginFocus::Password)
    }
}

/// Outcome of the last protected call, shown verbatim on the Home page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Pending,
    Body(String),
    Failed(String),
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Results sent from spawned tasks back to the UI loop. Errors travel as
/// display strings since they end up on screen.
#[derive(Debug)]
pub enum TaskResult {
    /// "Who am I" probe for the guarded page
    Probe(Result<User, String>),
    /// Protected resource call from the Home page
    Protected(Result<ApiBody, String>),
    /// Backend returned the provider URL; the browser has been pointed at it
    OAuthStarted(String),
    /// The browser came back to the loopback listener
    CallbackReceived,
    /// OAuth sign-in finished
    OAuthCompleted(Result<SignedIn, String>),
    /// Username/password sign-in finished
    PasswordLogin(Result<SignedIn, String>),
}

/// A task result tagged with the mount generation that started it.
#[derive(Debug)]
pub struct TaskMessage {
    pub mount: u64,
    pub result: TaskResult,
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    // Core services
    pub config: Config,
    config_path: PathBuf,
    pub session: Session,
    pub flow: AuthFlow,

    // UI State
    pub state: AppState,
    pub page: Route,
    mount: u64,
    pub guard: Option<RouteGuard>,
    /// Guarded route the user was sent away from, restored after sign-in.
    pub return_to: Option<Route>,
    pub user: Option<User>,
    pub call_outcome: Option<CallOutcome>,

    // Login form state
    pub login_username: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,
    pub login_busy: bool,

    // OAuth callback page
    pub callback_status: String,
    pub authorization_url: Option<String>,
    oauth_task: Option<JoinHandle<()>>,

    // Background task channel
    task_rx: mpsc::Receiver<TaskMessage>,
    task_tx: mpsc::Sender<TaskMessage>,

    // Status message
    pub status_message: Option<String>,
}

impl App {
    /// Create a new application instance from the on-disk config and session.
    pub fn new(api_url_override: Option<&str>, mode_override: Option<AuthMode>) -> Result<Self> {
        let config_path = Config::config_path()?;
        let mut config = match Config::load_from(&config_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        if let Some(mode) = mode_override {
            config.auth_mode = mode;
        }

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, "Cache directory configured");

        let mut session = Session::new(cache_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session, starting signed out");
        }

        let api = ApiClient::new(ApiSettings {
            base_url: config.api_url(api_url_override),
            endpoints: config.endpoints(),
        })?;
        let mut flow = AuthFlow::new(api, config.auth_mode);
        flow.restore(&session);

        let mut app = Self::from_parts(config, config_path, session, flow);
        if let Ok(username) = std::env::var("GATEHOUSE_USERNAME") {
            app.login_username = username;
        }
        Ok(app)
    }

    pub fn from_parts(
        config: Config,
        config_path: PathBuf,
        session: Session,
        flow: AuthFlow,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let login_username = config.last_username.clone().unwrap_or_default();

        Self {
            config,
            config_path,
            session,
            flow,

            state: AppState::Normal,
            page: Route::Login,
            mount: 0,
            guard: None,
            return_to: None,
            user: None,
            call_outcome: None,

            login_username,
            login_password: String::new(),
            login_focus: LoginFocus::Google,
            login_error: None,
            login_busy: false,

            callback_status: STATUS_PROCESSING.to_string(),
            authorization_url: None,
            oauth_task: None,

            task_rx: rx,
            task_tx: tx,

            status_message: None,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.flow.mode()
    }

    /// Whether the username/password form is shown on the Login page.
    pub fn shows_password_form(&self) -> bool {
        self.mode().supports_password_login() && !self.session.is_signed_in()
    }

    pub fn mount_generation(&self) -> u64 {
        self.mount
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Leave the current page and mount `route`. Page state is reset and any
    /// result still in flight for the old page will be ignored.
    pub fn navigate(&mut self, route: Route) {
        if let Some(task) = self.oauth_task.take() {
            // The loopback listener holds the callback port until it returns
            task.abort();
        }

        self.mount += 1;
        self.page = route;
        self.guard = None;
        self.user = None;
        self.call_outcome = None;
        debug!(route = %route, mount = self.mount, "Mounted page");

        match route {
            Route::Home => self.mount_home(),
            Route::Login => {
                self.login_error = None;
                self.login_busy = false;
                self.login_focus = LoginFocus::Google;
            }
            Route::OAuthCallback => {
                self.callback_status = STATUS_PROCESSING.to_string();
                self.authorization_url = None;
            }
        }
    }

    /// Mount the guarded Home page: probe unless the guard can already tell.
    fn mount_home(&mut self) {
        let mut guard = RouteGuard::mount(Route::Home);
        let probe = guard.needs_probe(self.mode(), self.flow.api().has_credential());
        let decision = guard.decision();
        self.guard = Some(guard);

        if probe {
            let flow = self.flow.clone();
            self.spawn(async move {
                TaskResult::Probe(flow.current_user().await.map_err(|e| format!("{:#}", e)))
            });
        } else {
            self.apply_guard_decision(decision);
        }
    }

    fn apply_guard_decision(&mut self, decision: GuardDecision) {
        match decision {
            GuardDecision::Wait => {}
            GuardDecision::Render(user) => {
                self.user = Some(user);
            }
            GuardDecision::Redirect { to, from } => {
                info!(from = %from, "Not signed in, redirecting to login");
                self.return_to = Some(from);
                self.navigate(to);
            }
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Start Google sign-in: open the callback page, bind the loopback
    /// listener, point the browser at the provider and wait for it to return.
    pub fn start_oauth(&mut self) {
        self.navigate(Route::OAuthCallback);
        self.callback_status = "Contacting the backend...".to_string();

        let flow = self.flow.clone();
        let port = self.config.callback_port;
        let tx = self.task_tx.clone();
        let mount = self.mount;

        self.oauth_task = Some(tokio::spawn(async move {
            let result = Self::run_oauth(flow, port, &tx, mount)
                .await
                .map_err(|e| format!("{:#}", e));
            Self::send_result(&tx, mount, TaskResult::OAuthCompleted(result)).await;
        }));
    }

    async fn run_oauth(
        flow: AuthFlow,
        port: u16,
        tx: &mpsc::Sender<TaskMessage>,
        mount: u64,
    ) -> Result<SignedIn> {
        let listener = CallbackListener::bind(port).await?;
        let url = flow.begin_oauth(&listener.redirect_url()).await?;

        Self::send_result(tx, mount, TaskResult::OAuthStarted(url.to_string())).await;
        if let Err(e) = open::that(url.as_str()) {
            warn!(error = %e, "Failed to open browser");
        }

        let callback = listener.wait(DEFAULT_CALLBACK_TIMEOUT).await?;
        Self::send_result(tx, mount, TaskResult::CallbackReceived).await;
        flow.complete_browser_callback(callback).await
    }

    /// Submit the username/password form.
    pub fn attempt_login(&mut self) {
        let username = self.login_username.trim().to_string();
        let password = self.login_password.clone();

        if username.is_empty() || password.is_empty() {
            self.login_error = Some("Username and password required".to_string());
            return;
        }

        self.login_error = None;
        self.login_busy = true;

        let flow = self.flow.clone();
        self.spawn(async move {
            let result = flow.login_with_password(&username, &password).await;
            if result.is_ok() {
                if let Err(e) = CredentialStore::store(&username, &password) {
                    warn!(error = %e, "Failed to store credentials");
                }
            }
            TaskResult::PasswordLogin(result.map_err(|e| login_error_message(&format!("{:#}", e))))
        });
    }

    /// Persist a fresh session and go where the user was headed.
    fn apply_sign_in(&mut self, signed_in: SignedIn) {
        let SignedIn { session, user } = signed_in;
        self.flow.attach(&session.credential);
        self.session.update(session);
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to save session");
            self.status_message = Some(format!(
                "Signed in, but the session was not saved: {:#}",
                e
            ));
        } else {
            self.status_message = Some(user.welcome_message());
        }

        self.login_password.clear();
        let destination = post_login_destination(self.return_to.take());
        self.navigate(destination);
    }

    /// Log out: the local credential is gone before Login is shown. The
    /// backend call, when the session involves a cookie, runs afterwards on a
    /// client that still holds the old jar.
    pub fn logout(&mut self) {
        let remote = if self.flow.needs_remote_logout(&self.session) {
            Some(self.flow.api().clone())
        } else {
            None
        };

        if let Err(e) = self.flow.clear_local(&mut self.session) {
            error!(error = %e, "Failed to clear local session");
            self.status_message = Some(format!("{:#}", e));
        } else {
            self.status_message = Some("Logged out".to_string());
        }
        self.return_to = None;
        self.navigate(Route::Login);

        if let Some(api) = remote {
            tokio::spawn(async move {
                if let Err(e) = api.logout_remote().await {
                    warn!(error = %format!("{:#}", e), "Backend logout failed");
                }
            });
        }
    }

    /// Call the protected resource from the Home page.
    pub fn call_protected(&mut self) {
        if self.page != Route::Home || self.user.is_none() {
            return;
        }
        self.call_outcome = Some(CallOutcome::Pending);
        let api = self.flow.api().clone();
        self.spawn(async move {
            TaskResult::Protected(api.call_protected().await.map_err(|e| format!("{:#}", e)))
        });
    }

    // =========================================================================
    // Background Tasks
    // =========================================================================

    /// Run `task` in the background and deliver its result tagged with the
    /// current mount generation.
    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = TaskResult> + Send + 'static,
    {
        let tx = self.task_tx.clone();
        let mount = self.mount;
        tokio::spawn(async move {
            let result = task.await;
            Self::send_result(&tx, mount, result).await;
        });
    }

    /// Helper to send task results, logging any channel errors
    async fn send_result(tx: &mpsc::Sender<TaskMessage>, mount: u64, result: TaskResult) {
        if let Err(e) = tx.send(TaskMessage { mount, result }).await {
            error!(error = %e, "Failed to send task result - channel closed");
        }
    }

    /// Check for completed background tasks and process results
    pub fn check_background_tasks(&mut self) {
        let mut messages = Vec::new();
        while let Ok(message) = self.task_rx.try_recv() {
            messages.push(message);
        }
        for message in messages {
            self.process_message(message);
        }
    }

    /// Apply one task result, unless the page that started it is gone.
    pub fn process_message(&mut self, message: TaskMessage) {
        if message.mount != self.mount {
            debug!(
                stale = message.mount,
                current = self.mount,
                "Dropping result for a page that is no longer mounted"
            );
            return;
        }

        match message.result {
            TaskResult::Probe(result) => {
                if let Err(ref e) = result {
                    debug!(error = %e, "Session probe failed");
                }
                let decision = match self.guard.as_mut() {
                    Some(guard) => guard.resolve(result),
                    None => return,
                };
                self.apply_guard_decision(decision);
            }
            TaskResult::Protected(result) => {
                self.call_outcome = Some(match result {
                    Ok(body) => CallOutcome::Body(body.display_string()),
                    Err(e) => CallOutcome::Failed(e),
                });
            }
            TaskResult::OAuthStarted(url) => {
                self.callback_status =
                    "Waiting for the browser to return from Google...".to_string();
                self.authorization_url = Some(url);
            }
            TaskResult::CallbackReceived => {
                self.callback_status = STATUS_PROCESSING.to_string();
            }
            TaskResult::OAuthCompleted(result) => {
                self.oauth_task = None;
                match result {
                    Ok(signed_in) => self.apply_sign_in(signed_in),
                    Err(e) => {
                        error!(error = %e, "OAuth sign-in failed");
                        self.callback_status = e;
                    }
                }
            }
            TaskResult::PasswordLogin(result) => {
                self.login_busy = false;
                match result {
                    Ok(signed_in) => {
                        self.config.last_username = Some(self.login_username.trim().to_string());
                        if let Err(e) = self.config.save_to(&self.config_path) {
                            warn!(error = %e, "Failed to save config");
                        }
                        self.apply_sign_in(signed_in);
                    }
                    Err(e) => {
                        self.login_error = Some(e);
                    }
                }
            }
        }
    }

    /// Short description of the stored session for the status bar.
    pub fn session_summary(&self) -> String {
        match self.session.data {
            Some(ref data) => {
                let who = data.email.as_deref().unwrap_or("unknown user");
                format!("{} ({}, {})", who, data.credential.kind(), data.age_display())
            }
            None => "Not signed in".to_string(),
        }
    }
}

/// Map a login failure to something a person can act on.
fn login_error_message(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("login_bad_credentials")
        || lower.contains("api 400")
        || lower.contains("api 401")
    {
        "Invalid username or password".to_string()
    } else if lower.contains("error sending request") || lower.contains("connect") {
        "Unable to connect to server. Is the backend running?".to_string()
    } else {
        message.to_string()
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

/// Check if a username character should be accepted
pub fn can_add_username_char(current_len: usize, c: char) -> bool {
    current_len < MAX_USERNAME_LENGTH && is_valid_input_char(c)
}

/// Check if a password character should be accepted
pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================
