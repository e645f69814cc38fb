//! hellou CLI - face authentication for PAM.
//!
//! # Commands
//!
//! ```text
//! hellou add <user>        enroll a face (multi-sample)       hellou install    add the directive to PAM chains
//! hellou remove <user>     delete an enrollment               hellou uninstall  restore PAM chains
//! hellou list              enrolled users                     hellou status     per-service chain state
//! hellou auth [--user]     authenticate (PAM entry point)     hellou test       one capture, count faces
//! hellou config set <section.key> <value>
//! ```
//!
//! `hellou auth` is meant to run under `pam_exec`; its exit status is the PAM
//! result code (see [`hellou_types::Outcome::pam_code`]). It reads only the
//! installed, root-controlled configuration.

mod commands;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hellou_config::{Paths, Settings};
use hellou_types::PAM_AUTH_ERR;

#[derive(Parser)]
#[command(name = "hellou")]
#[command(about = "Face authentication for PAM", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll a user's face
    Add {
        user: String,
        /// Number of single-face samples to average
        #[arg(long)]
        samples: Option<u32>,
        /// Replace an existing enrollment
        #[arg(long)]
        force: bool,
        /// Enroll a precomputed embedding (JSON array of numbers) instead of capturing
        #[arg(long, value_name = "FILE")]
        from_file: Option<PathBuf>,
    },
    /// Remove a user's enrollment
    Remove { user: String },
    /// List enrolled users
    List,
    /// Authenticate a user (PAM entry point)
    Auth {
        /// User to authenticate
        #[arg(long, env = "PAM_USER")]
        user: String,
    },
    /// Capture one frame and report detected faces
    Test,
    /// Add the authentication directive to PAM service chains
    Install {
        /// Services to change (defaults to `pam.services`)
        #[arg(long = "service")]
        services: Vec<String>,
    },
    /// Remove the directive and restore PAM service chains
    Uninstall {
        #[arg(long = "service")]
        services: Vec<String>,
    },
    /// Show per-service installation state
    Status,
    /// Edit the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set `section.key` to `value`, keeping comments intact
    Set { key: String, value: String },
}

fn init_tracing(log_path: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = match log_path {
        Some(path) => open_log_file(path),
        None => (None, Vec::new()),
    };

    if let Some((path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::debug!(path = %path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No usable log file: keep diagnostics on stderr so stdout stays clean for
    // the PAM conversation.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(path: &Path) -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warnings.push(format!(
            "Failed to create log dir {}: {e}",
            parent.display()
        ));
        return (None, warnings);
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => (Some((path.to_path_buf(), file)), warnings),
        Err(e) => {
            warnings.push(format!("Failed to open log file {}: {e}", path.display()));
            (None, warnings)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let is_auth = matches!(cli.command, Command::Auth { .. });

    // `auth` runs inside the PAM stack with the caller's working directory, so
    // it never looks at development-layout config.
    let (paths, settings) = if is_auth {
        let paths = Paths::installed();
        let settings = Settings::load_trusted(&paths);
        (paths, settings)
    } else {
        let paths = Paths::detect();
        let settings = Settings::load(&paths);
        (paths, settings)
    };
    init_tracing(settings.as_ref().ok().map(|s| s.log_path.as_path()));

    let result = match settings {
        Ok(settings) => commands::run(cli.command, &paths, &settings).await,
        Err(e) => Err(anyhow::Error::new(e).context("failed to load configuration")),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            if is_auth {
                // Never let a fault look like anything but a failed factor.
                ExitCode::from(PAM_AUTH_ERR as u8)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
