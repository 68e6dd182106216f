//! Terminal client for Huddle meeting sessions.
//!
//! Joins a session's push channel, shows the roster, the current speaker and
//! incoming comments, and lets the user post rated comments and summaries.
//! Reconnects automatically on disconnection (max 5 attempts with a linearly
//! growing delay).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin huddle -- join weekly-sync
//! cargo run --bin huddle -- --base-url https://meet.example.com sessions list
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};

use huddle_client::{
    ClientError, HttpSessionApi, SessionApi, SyncConfig,
    config::DEFAULT_BASE_URL,
    gateway::{create_session, delete_session},
    terminal::{SnapshotFormatter, run_session},
};
use huddle_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(
    about = "Meeting session client with live roster, turn taking and rated comments",
    long_about = None
)]
struct Args {
    /// Base address of the meeting backend
    #[arg(short = 'u', long, env = "HUDDLE_API_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Session cookie obtained from a browser login (e.g. "session=...")
    #[arg(long, env = "HUDDLE_SESSION_COOKIE", hide_env_values = true)]
    session_cookie: Option<String>,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join a session and follow it live
    Join {
        /// Session identifier
        session_id: String,
    },
    /// Manage sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
    /// Show the logged-in user
    Whoami,
}

#[derive(Subcommand, Debug)]
enum SessionCommands {
    /// List all sessions
    List,
    /// Create a session (administrators only)
    Create { name: String },
    /// Delete a session (administrators only)
    Delete { session_id: String },
}

async fn run(args: Args) -> Result<(), ClientError> {
    let config = SyncConfig::new(&args.base_url)?;
    let api = Arc::new(HttpSessionApi::new(
        config.base_url.clone(),
        args.session_cookie.as_deref(),
    )?);

    match args.command {
        Commands::Join { session_id } => run_session(config, api, session_id).await,
        Commands::Sessions(SessionCommands::List) => {
            let sessions = api.list_sessions().await?;
            print!(
                "{}",
                SnapshotFormatter::format_sessions(&sessions, chrono::Utc::now())
            );
            Ok(())
        }
        Commands::Sessions(SessionCommands::Create { name }) => {
            let session = create_session(api.as_ref(), &name).await?;
            println!("Created session '{}' ({})", session.name, session.id);
            Ok(())
        }
        Commands::Sessions(SessionCommands::Delete { session_id }) => {
            delete_session(api.as_ref(), &session_id).await?;
            println!("Deleted session {}", session_id);
            Ok(())
        }
        Commands::Whoami => {
            let user = api.current_user().await?;
            print!("{}", SnapshotFormatter::format_user(user.as_ref()));
            if user.is_none() {
                println!("Log in at {}", config.login_url()?);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    if let Err(e) = run(args).await {
        if e.requires_login() {
            tracing::error!("Not logged in");
            eprintln!("Not logged in. Log in through the web app and pass --session-cookie.");
        } else {
            tracing::error!("Client error: {}", e);
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}
