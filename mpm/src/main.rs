//! Music Per Minute - plays music while you type.
//!
//! The editor extension starts `mpm run` and talks to it over stdio. The
//! other commands manage the stored Spotify credentials.
//!
//! # Commands
//!
//! - `mpm login`: Open the authorization page and store the pasted token
//! - `mpm run`: Start a session speaking the editor protocol on stdio
//! - `mpm logout`: Forget stored credentials, settings and profile
//! - `mpm status`: Show what is stored
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use mpm::backend::BackendClient;
use mpm::config::Config;
use mpm::playback::PlaybackCommand;
use mpm::player::Player;
use mpm::protocol::{EditorMessage, HostMessage};
use mpm::session::{Reporting, Session, SessionConfig};
use mpm::spotify::SpotifyClient;
use mpm::store::SettingsStore;
use mpm::token::{TokenError, TokenManager};

/// Music Per Minute - plays music while you type.
///
/// Keeps Spotify playing while you are typing and pauses it when you stop.
#[derive(Parser, Debug)]
#[command(name = "mpm")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    MPM_BACKEND_URL           Companion backend (default: https://mpm-node-backend.herokuapp.com)
    MPM_SPOTIFY_API_URL       Spotify Web API (default: https://api.spotify.com)
    MPM_AUTH_URL              Authorization page (default: https://ciavarella.dev/auth/login)
    MPM_STATE_DIR             State directory (default: ~/.mpm)
    MPM_KEYPRESS              Seconds of music per keystroke (default: 1)
    MPM_HARD_MODE             Backspace stops the music (default: false)
    MPM_REPORT_INTERVAL_SECS  Seconds between reports (default: 60)

EXAMPLES:
    # Authorize with Spotify
    mpm login

    # Store a token copied earlier
    mpm login --token '<access>?refresh_token=<refresh>'

    # Start a session (normally done by the editor extension)
    mpm run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize with Spotify.
    ///
    /// Opens the authorization page and waits for the token it shows to be
    /// pasted. The token has the form `<access>?refresh_token=<refresh>`.
    Login {
        /// Use this token instead of prompting.
        #[arg(short, long)]
        token: Option<String>,

        /// Do not open the authorization page in a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Start a session.
    ///
    /// Reads editor messages from stdin and writes status messages to stdout,
    /// one JSON object per line.
    Run,

    /// Forget stored credentials, settings and profile.
    Logout,

    /// Show stored credentials and settings.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let config = Config::from_env().context("Failed to load configuration")?;
    debug!(
        backend_url = %config.backend_url,
        spotify_api_url = %config.spotify_api_url,
        state_dir = %config.state_dir.display(),
        "Configuration loaded"
    );

    match cli.command {
        Command::Logout => run_logout(&config),
        Command::Status => run_status(&config),
        Command::Login { token, no_browser } => {
            runtime()?.block_on(run_login(&config, token, no_browser))
        }
        Command::Run => runtime()?.block_on(run_session(&config)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

/// Runs the login flow.
async fn run_login(config: &Config, token: Option<String>, no_browser: bool) -> Result<()> {
    let store = SettingsStore::new(&config.state_dir);
    let backend = BackendClient::new(config.backend_url.as_str())
        .context("Failed to create backend client")?;
    let spotify = SpotifyClient::new(config.spotify_api_url.as_str())
        .context("Failed to create Spotify client")?;

    let tokens = match token {
        Some(raw) => {
            let raw = Zeroizing::new(raw);
            TokenManager::bootstrap(&raw, store.clone(), backend.clone())
                .context("Failed to store token")?
        }
        None => {
            if !no_browser {
                open_auth_page(&config.auth_url);
            }
            prompt_for_tokens(&config.auth_url, &store, &backend).await?
        }
    };

    let mut player = Player::new(tokens, spotify);

    let user = player
        .current_user()
        .await
        .context("Failed to fetch Spotify profile")?;
    store
        .update(|s| s.user = Some(user.clone()))
        .context("Failed to store Spotify profile")?;
    info!(user = %user.id, "Spotify profile stored");

    let state = store.load().context("Failed to load state")?;
    backend.resolve_settings(&store, &state, config.settings).await;

    if let Err(e) = player.prepare_device().await {
        warn!(error = %e, "Could not prepare a playback device");
    }
    if let Err(e) = player.execute(PlaybackCommand::Pause).await {
        warn!(error = %e, "Initial pause failed");
    }

    let name = user
        .display_name
        .as_deref()
        .or(user.email.as_deref())
        .unwrap_or(&user.id);
    println!("Logged in to Spotify as {name}.");
    Ok(())
}

/// Reads pasted tokens until one parses.
async fn prompt_for_tokens(
    auth_url: &str,
    store: &SettingsStore,
    backend: &BackendClient,
) -> Result<TokenManager> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Authorize mpm at {auth_url}");
    loop {
        eprint!("Paste the token shown on the page: ");

        let Some(line) = lines.next_line().await.context("Failed to read token")? else {
            bail!("No token entered");
        };
        let raw = Zeroizing::new(line);

        match TokenManager::bootstrap(&raw, store.clone(), backend.clone()) {
            Ok(tokens) => return Ok(tokens),
            Err(TokenError::MalformedToken) => {
                eprintln!("{}", TokenError::MalformedToken);
            }
            Err(e) => return Err(e).context("Failed to store token"),
        }
    }
}

fn open_auth_page(url: &str) {
    match webbrowser::open(url) {
        Ok(()) => debug!(url, "Opened authorization page"),
        Err(e) => warn!(url, error = %e, "Could not open a browser"),
    }
}

/// Runs a session until the editor says stop, stdin closes or a signal
/// arrives.
async fn run_session(config: &Config) -> Result<()> {
    let store = SettingsStore::new(&config.state_dir);
    let state = store.load().context("Failed to load state")?;
    if !state.has_credentials() {
        return Err(TokenError::MissingCredentials.into());
    }

    let backend = BackendClient::new(config.backend_url.as_str())
        .context("Failed to create backend client")?;
    let spotify = SpotifyClient::new(config.spotify_api_url.as_str())
        .context("Failed to create Spotify client")?;

    let settings = backend.resolve_settings(&store, &state, config.settings).await;

    let tokens = TokenManager::from_state(&state, store.clone(), backend.clone())?;
    let player = Player::new(tokens, spotify).spawn(true);

    let session_config = SessionConfig {
        report_interval: config.report_interval,
        settings,
        ..SessionConfig::default()
    };
    let reporting = Reporting {
        backend,
        user: state.user.clone(),
    };
    let (handle, mut updates) = Session::spawn(session_config, player, Some(reporting));

    let mut lines: Lines<BufReader<Stdin>> = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut current = settings;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("Session running, reading editor messages from stdin");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("Editor closed stdin");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read from stdin");
                        break;
                    }
                };

                let message = match EditorMessage::parse_line(&line) {
                    Ok(Some(message)) => message,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "Skipping editor message");
                        continue;
                    }
                };

                if message == EditorMessage::Stop {
                    info!("Editor requested stop");
                    break;
                }
                if let Some(event) = message.activity_event() {
                    handle.send_event(event).await?;
                } else if let Some(settings) = message.merged_settings(current) {
                    current = settings;
                    handle.update_settings(settings).await?;
                    if let Err(e) = store.update(|s| s.settings = Some(settings)) {
                        warn!(error = %e, "Failed to store settings");
                    }
                }
            }

            Some(update) = updates.recv() => {
                let message = HostMessage::Status { text: update.text() };
                write_message(&mut stdout, &message).await?;
            }
        }
    }

    let summary = handle.dispose().await;
    write_message(&mut stdout, &HostMessage::Stopped).await?;

    info!(
        unreported_seconds = summary.stats.elapsed_seconds,
        unreported_music_seconds = summary.stats.music_seconds,
        "Session ended"
    );
    Ok(())
}

async fn write_message(stdout: &mut Stdout, message: &HostMessage) -> Result<()> {
    let mut line = message.to_line();
    line.push('\n');
    stdout
        .write_all(line.as_bytes())
        .await
        .context("Failed to write to stdout")?;
    stdout.flush().await.context("Failed to flush stdout")?;
    Ok(())
}

/// Runs the logout command.
fn run_logout(config: &Config) -> Result<()> {
    let store = SettingsStore::new(&config.state_dir);
    store.clear().context("Failed to clear state")?;
    println!("Logged out.");
    Ok(())
}

/// Runs the status command. Never prints the tokens themselves.
fn run_status(config: &Config) -> Result<()> {
    let store = SettingsStore::new(&config.state_dir);
    let state = store.load().context("Failed to load state")?;

    println!("State file: {}", store.path().display());

    if !state.has_credentials() {
        println!("Not logged in. Run 'mpm login'.");
        return Ok(());
    }

    match state.expires.and_then(|exp| DateTime::from_timestamp(exp, 0)) {
        Some(expires) => println!("Access token expires: {}", expires.to_rfc3339()),
        None => println!("Access token expires: unknown (will refresh on first use)"),
    }

    if let Some(user) = &state.user {
        println!("Spotify user: {}", user.id);
        if let Some(email) = &user.email {
            println!("Email: {email}");
        }
    }

    let settings = state.settings.unwrap_or(config.settings);
    println!("Keypress: {}", settings.keypress);
    println!("Hard mode: {}", if settings.hard_mode { "on" } else { "off" });
    Ok(())
}

/// Initializes the logging subsystem. Logs go to stderr since stdout carries
/// the editor protocol.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
