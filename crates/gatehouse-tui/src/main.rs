//! Gatehouse - sign in to a fastapi-users style backend from the terminal.
//!
//! Without a subcommand this starts the TUI. The subcommands cover the same
//! flows for scripts and for terminals where a full-screen UI is unwelcome.

mod app;
mod commands;
mod ui;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gatehouse_core::config::{AuthMode, Config};
use gatehouse_core::guard::Route;

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE_PREFIX: &str = "gatehouse.log";

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Backend base URL (default: http://localhost:8000)
    #[arg(long, global = true, env = "GATEHOUSE_API_URL")]
    pub api_url: Option<String>,

    /// Credential model the backend uses: bearer or cookie
    #[arg(long, global = true, env = "GATEHOUSE_AUTH_MODE")]
    pub mode: Option<AuthMode>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with Google, or with a username and password
    Login(commands::LoginArgs),

    /// Finish a Google sign-in from a pasted callback URL
    Callback(commands::CallbackArgs),

    /// Sign out and forget the stored session
    Logout(commands::LogoutArgs),

    /// Show the signed-in user
    Whoami,

    /// Call a backend path with the stored credential
    Call(commands::CallArgs),

    /// Show the stored session without contacting the backend
    Status,
}

// ============================================================================
// Logging
// ============================================================================

fn env_filter() -> EnvFilter {
    // RUST_LOG controls the level (e.g. RUST_LOG=gatehouse_core=debug)
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Log to stderr for the CLI subcommands.
fn init_cli_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter())
        .init();
}

/// Log to a daily file for the TUI, which owns the terminal.
fn init_tui_tracing(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .with(env_filter())
        .init();
    guard
}

fn log_dotenv(result: &dotenvy::Result<PathBuf>) {
    match result {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => debug!(error = %e, "Ignoring unreadable .env file"),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present; the outcome is logged once tracing is up
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let ctx = commands::Context {
        api_url: cli.api_url.clone(),
        mode: cli.mode,
    };

    match cli.command {
        None => run_tui(&ctx, &dotenv).await,
        Some(command) => {
            init_cli_tracing();
            log_dotenv(&dotenv);
            let result = match command {
                Commands::Login(args) => commands::login(args, &ctx).await,
                Commands::Callback(args) => commands::callback(args, &ctx).await,
                Commands::Logout(args) => commands::logout(args, &ctx).await,
                Commands::Whoami => commands::whoami(&ctx).await,
                Commands::Call(args) => commands::call(args, &ctx).await,
                Commands::Status => commands::status(&ctx),
            };
            if let Err(e) = result {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn run_tui(ctx: &commands::Context, dotenv: &dotenvy::Result<PathBuf>) -> Result<()> {
    let log_dir = Config::default()
        .cache_dir()
        .unwrap_or_else(|_| PathBuf::from("./cache"));
    std::fs::create_dir_all(&log_dir)?;
    let _log_guard = init_tui_tracing(&log_dir);
    log_dotenv(dotenv);
    info!("Gatehouse TUI starting");

    // Create app before touching the terminal so config errors print normally
    let mut app = App::new(ctx.api_url.as_deref(), ctx.mode)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Home is guarded: its probe decides whether Login is shown instead
    app.navigate(Route::Home);

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
    }

    info!("Gatehouse TUI shutting down");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                if handle_input(app, key) {
                    return Ok(());
                }
            }
        }

        // Check for completed background tasks
        app.check_background_tasks();

        // Check if we should quit
        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}
