//! firechat - terminal client for Firestore-backed chat rooms
//!
//! One-shot commands for listing, reading and sending, plus a live
//! full-screen chat view.

mod api;
mod auth;
mod config;
mod demo;
mod models;
mod screen;
mod store;
mod tui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::client::ChatClient;
use crate::api::load_chat;
use crate::screen::ChatScreen;
use crate::tui::LogBuffer;

#[derive(Parser)]
#[command(name = "firechat")]
#[command(about = "Terminal client for Firestore-backed chat rooms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Firebase project to talk to
    Init {
        /// Firebase project ID
        #[arg(long)]
        project_id: String,

        /// Firebase web API key
        #[arg(long)]
        api_key: String,

        /// Firestore REST endpoint override (e.g. http://localhost:8080/v1 for the emulator)
        #[arg(long)]
        firestore_url: Option<String>,

        /// Live update polling period in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "FIRECHAT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Sign in again even if a valid session exists
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Show the signed-in profile
    Whoami,

    /// List conversations you take part in
    Chats {
        /// Maximum number of chats to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Read messages from a chat
    Read {
        /// Chat ID (from `chats` output)
        chat_id: String,

        /// Maximum number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print as JSON, in the format accepted by `tui --fallback`
        #[arg(long)]
        json: bool,
    },

    /// Send a message
    Send {
        /// Chat ID (from `chats` output)
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,
    },

    /// Open the live chat screen
    Tui {
        /// Chat ID (from `chats` output)
        chat_id: String,

        /// JSON message list shown until live data arrives
        #[arg(long)]
        fallback: Option<PathBuf>,
    },

    /// Try the chat screen offline against sample data
    Demo,
}

impl Commands {
    /// Full-screen commands log into the in-app pane instead of the terminal.
    fn is_fullscreen(&self) -> bool {
        matches!(self, Commands::Tui { .. } | Commands::Demo)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let log_buffer = LogBuffer::new();
    if cli.command.is_fullscreen() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(log_buffer.clone()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    match cli.command {
        Commands::Init {
            project_id,
            api_key,
            firestore_url,
            poll_ms,
        } => {
            config::init(&project_id, &api_key, firestore_url, poll_ms)?;
        }
        Commands::Login {
            email,
            password,
            force,
        } => {
            tracing::info!("Signing in as {}...", email);
            auth::login(&email, &password, force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Whoami => {
            api::whoami().await?;
        }
        Commands::Chats { limit } => {
            tracing::info!("Fetching chats...");
            api::list_chats(limit).await?;
        }
        Commands::Read {
            chat_id,
            limit,
            json,
        } => {
            api::read_messages(&chat_id, limit, json).await?;
        }
        Commands::Send { to, message } => {
            tracing::info!("Sending message...");
            api::send_message(&to, &message).await?;
        }
        Commands::Tui { chat_id, fallback } => {
            open_chat(&chat_id, fallback, log_buffer).await?;
        }
        Commands::Demo => {
            demo::run(log_buffer).await?;
        }
    }

    Ok(())
}

async fn open_chat(chat_id: &str, fallback: Option<PathBuf>, log_buffer: LogBuffer) -> Result<()> {
    let fallback_json = match fallback {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let client = ChatClient::new().await?;
    let chat = load_chat(client.store().as_ref(), chat_id).await?;
    let screen = ChatScreen::open(
        client.store(),
        chat,
        client.me().clone(),
        fallback_json.as_deref(),
        client.poll_interval(),
    )?;
    tui::run(screen, log_buffer).await
}
