//! CLI subcommands.
//!
//! Each command loads the config and stored session, runs one flow and
//! prints the outcome. Errors propagate to `main`, which prints them with
//! their context chain.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use tracing::{debug, warn};

use gatehouse_core::api::{ApiClient, ApiSettings, RequestOptions};
use gatehouse_core::auth::{
    AuthFlow, CallbackListener, CallbackParams, CredentialStore, Session, SignedIn,
    DEFAULT_CALLBACK_TIMEOUT,
};
use gatehouse_core::config::{AuthMode, Config, DEFAULT_API_PREFIX};

/// Settings shared by every subcommand.
pub struct Context {
    pub api_url: Option<String>,
    pub mode: Option<AuthMode>,
}

#[derive(Args)]
pub struct LoginArgs {
    /// Use the username/password form instead of Google
    #[arg(long)]
    pub password: bool,

    /// Username for password login (default: the last one used)
    #[arg(long, short)]
    pub username: Option<String>,

    /// Print the Google URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,
}

#[derive(Args)]
pub struct CallbackArgs {
    /// The URL the browser landed on, or just its query string
    pub url: String,
}

#[derive(Args)]
pub struct LogoutArgs {
    /// Also remove the remembered password from the OS keychain
    #[arg(long)]
    pub forget: bool,
}

#[derive(Args)]
pub struct CallArgs {
    /// Backend path (default: the protected example route)
    pub path: Option<String>,
}

/// Everything a command needs, loaded from disk.
struct Setup {
    config: Config,
    config_path: PathBuf,
    session: Session,
    flow: AuthFlow,
}

fn setup(ctx: &Context) -> Result<Setup> {
    let config_path = Config::config_path()?;
    let mut config = Config::load_from(&config_path)?;
    if let Some(mode) = ctx.mode {
        config.auth_mode = mode;
    }

    let mut session = Session::new(config.cache_dir()?);
    session.load()?;

    let api = ApiClient::new(ApiSettings {
        base_url: config.api_url(ctx.api_url.as_deref()),
        endpoints: config.endpoints(),
    })?;
    let mut flow = AuthFlow::new(api, config.auth_mode);
    flow.restore(&session);

    Ok(Setup {
        config,
        config_path,
        session,
        flow,
    })
}

fn persist(session: &mut Session, signed_in: SignedIn) -> Result<()> {
    let SignedIn { session: data, user } = signed_in;
    let kind = data.credential.kind();
    session.update(data);
    session.save().context("Failed to save session")?;
    println!("{}", user.welcome_message());
    println!("Stored {} for future requests.", kind);
    Ok(())
}

// ============================================================================
// login
// ============================================================================

pub async fn login(args: LoginArgs, ctx: &Context) -> Result<()> {
    let mut setup = setup(ctx)?;

    if args.password {
        return login_with_password(&mut setup, args.username).await;
    }

    let listener = CallbackListener::bind(setup.config.callback_port).await?;
    let url = setup.flow.begin_oauth(&listener.redirect_url()).await?;

    println!("To sign in with Google, visit:");
    println!();
    println!("  {}", url);
    println!();

    if !args.no_browser {
        if let Err(e) = open::that(url.as_str()) {
            warn!(error = %e, "Failed to open browser");
        }
    }

    println!(
        "Waiting for the browser to return to {} ...",
        listener.redirect_url()
    );
    println!("(If it lands elsewhere, run `gatehouse callback <URL>` with the address it shows.)");

    let callback = listener.wait(DEFAULT_CALLBACK_TIMEOUT).await?;
    println!("Processing login...");
    let signed_in = setup.flow.complete_browser_callback(callback).await?;
    persist(&mut setup.session, signed_in)
}

async fn login_with_password(setup: &mut Setup, username: Option<String>) -> Result<()> {
    if !setup.config.auth_mode.supports_password_login() {
        bail!(
            "Password login uses the cookie transport; run with --mode cookie (current mode: {})",
            setup.config.auth_mode
        );
    }

    let username = match username.or_else(|| setup.config.last_username.clone()) {
        Some(username) => username,
        None => prompt_line("Username: ")?,
    };
    if username.is_empty() {
        bail!("Username required");
    }

    let password = if CredentialStore::has_credentials(&username)
        && prompt_line("Use stored password? [Y/n]: ")?.to_lowercase() != "n"
    {
        CredentialStore::get_password(&username)?
    } else {
        rpassword::prompt_password("Password: ")?
    };

    println!("Authenticating...");
    let signed_in = setup.flow.login_with_password(&username, &password).await?;

    if let Err(e) = CredentialStore::store(&username, &password) {
        warn!(error = %e, "Failed to store credentials");
    }
    setup.config.last_username = Some(username);
    if let Err(e) = setup.config.save_to(&setup.config_path) {
        warn!(error = %e, "Failed to save config");
    }

    persist(&mut setup.session, signed_in)
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

// ============================================================================
// callback / logout / whoami / call / status
// ============================================================================

pub async fn callback(args: CallbackArgs, ctx: &Context) -> Result<()> {
    let mut setup = setup(ctx)?;
    let params = CallbackParams::parse(&args.url)?;
    debug!(?params, "Parsed callback URL");

    println!("Processing login...");
    let signed_in = setup.flow.complete_callback(params).await?;
    persist(&mut setup.session, signed_in)
}

pub async fn logout(args: LogoutArgs, ctx: &Context) -> Result<()> {
    let mut setup = setup(ctx)?;
    let was_signed_in = setup.session.is_signed_in();

    setup.flow.logout(&mut setup.session).await?;

    if args.forget {
        if let Some(ref username) = setup.config.last_username {
            if CredentialStore::has_credentials(username) {
                CredentialStore::delete(username)?;
                println!("Forgot the stored password for {}.", username);
            }
        }
    }

    if was_signed_in {
        println!("Logged out.");
    } else {
        println!("No stored session; cleared any backend cookie.");
    }
    Ok(())
}

pub async fn whoami(ctx: &Context) -> Result<()> {
    let setup = setup(ctx)?;
    let user = setup
        .flow
        .current_user()
        .await
        .context("Not signed in or session expired")?;

    println!("{}", user.email);
    if let Some(id) = user.id_display() {
        println!("  id:        {}", id);
    }
    println!("  active:    {}", user.is_active);
    println!("  verified:  {}", user.is_verified);
    println!("  superuser: {}", user.is_superuser);
    Ok(())
}

pub async fn call(args: CallArgs, ctx: &Context) -> Result<()> {
    let setup = setup(ctx)?;
    let api = setup.flow.api();
    let path = args
        .path
        .unwrap_or_else(|| api.endpoints().protected.clone());

    let body = api.request(&path, RequestOptions::get()).await?;
    println!("{}", body);
    Ok(())
}

pub fn status(ctx: &Context) -> Result<()> {
    let setup = setup(ctx)?;
    let config = &setup.config;

    println!("Backend:   {}", config.api_url(ctx.api_url.as_deref()));
    println!("Prefix:    {}", config.api_prefix.as_deref().unwrap_or(DEFAULT_API_PREFIX));
    println!("Auth mode: {}", config.auth_mode);

    match setup.session.data {
        Some(ref data) => {
            println!(
                "Session:   {} for {}, stored {}",
                data.credential.kind(),
                data.email.as_deref().unwrap_or("unknown user"),
                data.age_display()
            );
        }
        None => println!("Session:   none"),
    }
    Ok(())
}
