use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use fieldeyes_session::{
    load_session_config, MemoryStorage, NavigationError, Navigator, Session, SessionConfig,
    SessionMetrics, SessionState,
};
use serde::Serialize;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(StructOpt, Debug)]
#[structopt(name = "fieldeyes-session", about = "Inspect and manage the FieldEyes dashboard session")]
struct Cli {
    /// Session file backing the durable token slot (default: FIELDEYES_SESSION_FILE, then ~/.fieldeyes/session.json)
    #[structopt(long, parse(from_os_str))]
    file: Option<PathBuf>,
    /// Print session metrics after the command runs
    #[structopt(long)]
    metrics: bool,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Store a bearer token issued by the login flow
    Login {
        #[structopt(long)]
        token: String,
    },
    /// Report whether the stored token is usable
    Status,
    /// Print the decoded claims of a valid session
    Whoami,
    /// Print the Authorization header for API calls
    Header,
    /// Clear the stored token
    Logout,
}

/// Headless stand-in for a browser redirect.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, path: &str) -> Result<(), NavigationError> {
        eprintln!("Signed out. Sign in again at {path}");
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReport<'a> {
    state: &'a str,
    authenticated: bool,
    admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

fn default_session_file() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot locate home directory; pass --file"))?;
    Ok(home.join(".fieldeyes").join("session.json"))
}

fn build_session(config: &SessionConfig, metrics: SessionMetrics) -> Result<Session> {
    let durable = config
        .durable_storage()
        .ok_or_else(|| anyhow!("No session file configured"))?;
    let store = config.token_store(Arc::new(durable), Arc::new(MemoryStorage::new()));
    Ok(config
        .session_builder(store)
        .with_navigator(Arc::new(TerminalNavigator))
        .with_metrics(metrics)
        .build())
}

fn status_report(state: &SessionState) -> StatusReport<'static> {
    match state {
        SessionState::Absent => StatusReport {
            state: "absent",
            authenticated: false,
            admin: false,
            reason: None,
            expires_at: None,
        },
        SessionState::Invalid(err) => StatusReport {
            state: "invalid",
            authenticated: false,
            admin: false,
            reason: Some(err.to_string()),
            expires_at: None,
        },
        SessionState::Valid(claims) => StatusReport {
            state: "valid",
            authenticated: true,
            admin: claims.is_admin(),
            reason: None,
            expires_at: Some(claims.expires_at.to_rfc3339()),
        },
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = load_session_config()?;
    let file = match cli.file {
        Some(file) => file,
        None => match config.storage_path.take() {
            Some(file) => file,
            None => default_session_file()?,
        },
    };
    config = config.with_storage_path(file);

    let metrics = SessionMetrics::new().context("Failed to register session metrics")?;
    let session = build_session(&config, metrics.clone())?;

    let code = match cli.command {
        Command::Login { token } => {
            session.store().set_token(token.trim());
            info!(path = ?config.storage_path, "token stored");
            let report = status_report(&session.state());
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.authenticated {
                0
            } else {
                1
            }
        }
        Command::Status => {
            let report = status_report(&session.state());
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.authenticated {
                0
            } else {
                1
            }
        }
        Command::Whoami => match session.claims() {
            Some(claims) => {
                println!("{}", serde_json::to_string_pretty(&claims)?);
                0
            }
            None => {
                eprintln!("Not signed in");
                1
            }
        },
        Command::Header => match session.authorization_header() {
            Some(value) => {
                let value = value
                    .to_str()
                    .context("Authorization header is not printable")?
                    .to_string();
                println!("Authorization: {value}");
                0
            }
            None => {
                eprintln!("Not signed in");
                1
            }
        },
        Command::Logout => {
            let outcome = session.logout();
            info!(was_signed_in = outcome.was_signed_in, "logout complete");
            0
        }
    };

    if cli.metrics {
        print!("{}", metrics.render()?);
    }
    Ok(code)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = run(Cli::from_args())?;
    std::process::exit(code);
}
