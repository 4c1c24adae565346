//! rai - terminal front-end for the RAI accessibility map account
//!
//! Sign in, inspect and edit the profile, and drive the push flow from a
//! shell. Logs go to ~/.rai/logs/rai.log unless --verbose is given.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use rai_core::push::NotificationType;
use rai_core::{paths, ClientConfig, CoreError};

mod commands;

/// RAI account and notifications client
#[derive(Parser)]
#[command(name = "rai")]
#[command(about = "Account and push notification client for RAI", long_about = None)]
struct Cli {
    /// Backend URL (overrides config file and RAI_API_BASE_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Refresh the cached profile from the server and print it
    Whoami,

    /// Show the stored session without contacting the server
    Status,

    /// Change profile fields or the avatar
    UpdateProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Image file to upload as the new avatar
        #[arg(long, conflicts_with = "remove_avatar")]
        avatar: Option<PathBuf>,
        #[arg(long)]
        remove_avatar: bool,
    },

    /// List push subscriptions registered on the server
    Subscriptions,

    /// Send a notification to every subscriber (moderators only)
    Notify {
        #[arg(short = 't', long = "type", default_value = "general")]
        kind: NotificationType,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = "/")]
        url: String,
    },

    /// Subscribe an in-process push host, deliver a payload through the
    /// background worker, then unsubscribe again
    PushCheck {
        /// Push body to deliver (JSON, or anything to see the fallback)
        #[arg(long, default_value = r#"{"title":"Test","body":"Push pipeline works","url":"/"}"#)]
        payload: String,
    },

    /// Mark notifications as read
    MarkRead,
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_path = log_dir.join(rai_core::constants::config::LOG_FILE_NAME);
    let log_file = match std::fs::File::create(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to create log file: {}, falling back to null device",
                e
            );
            std::fs::File::create(null_device)?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = ClientConfig::load()?;
    if let Some(url) = cli.api_url {
        config = config.with_base_url(url);
    }
    tracing::info!(api = config.base_url(), "Starting rai");

    if let Err(e) = commands::run(cli.command, config).await {
        let message = match e.downcast_ref::<CoreError>() {
            Some(core) => core.user_message(),
            None => format!("{:#}", e),
        };
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    Ok(())
}
