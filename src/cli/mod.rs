//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod format;
pub mod history;
pub mod limits;
pub mod logs;
pub mod say;


use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::format::run_format;
use crate::cli::history::run_history;
use crate::cli::limits::run_limits;
use crate::cli::logs::run_logs;
use crate::cli::say::run_say;
use crate::core::config::data::home_relative;
use crate::core::config::Config;
use crate::core::constants::DEFAULT_IDENTIFIER;
use crate::core::session::Session;
use crate::utils::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "super-okai")]
#[command(version)]
#[command(about = "Persona chat core: rate limits, history, logs and reply styling")]
#[command(
    long_about = "super-okai drives the persistence and throttling core of a persona chat \
from the shell. Replies are supplied on the command line; super-okai applies the persona's \
style, enforces the per-identifier rate limit, stores the conversation and appends it to \
the conversation log.\n\n\
Files:\n\
  config.toml       Loaded from the platform config directory unless --config is given\n\
  storage dir       One JSON record per store, overridable with --storage-dir\n\n\
Environment Variables:\n\
  RUST_LOG          Diagnostics filter for stderr output (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted stores (overrides the config file)
    #[arg(short = 's', long, global = true, value_name = "DIR")]
    pub storage_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one exchange: rate-limit, style the reply, save and log it
    Say {
        /// Persona answering the prompt
        #[arg(short = 'p', long, default_value = "Okai")]
        persona: String,
        /// Rate limit identifier for the caller
        #[arg(short = 'i', long, default_value = DEFAULT_IDENTIFIER)]
        identifier: String,
        /// Raw model reply to style and store
        #[arg(short = 'r', long, allow_hyphen_values = true)]
        reply: String,
        /// The user's message
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Style text in a persona's voice without storing anything
    Format {
        /// Persona whose style to apply
        #[arg(short = 'p', long, default_value = "Okai")]
        persona: String,
        /// Override the persona's chat length
        #[arg(short = 'l', long, value_parser = ["short", "normal", "long"])]
        length: Option<String>,
        /// Text to style
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Show or clear stored conversation history
    History {
        /// Persona whose history to show or clear; lists personas when omitted
        persona: Option<String>,
        /// Clear the given persona's history
        #[arg(long, requires = "persona", conflicts_with = "clear_all")]
        clear: bool,
        /// Clear every persona's history
        #[arg(long)]
        clear_all: bool,
    },
    /// Inspect, export or prune the conversation log
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },
    /// Inspect or reset rate limits
    Limits {
        #[command(subcommand)]
        action: LimitsAction,
    },
    /// Print the effective configuration
    Config {
        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LogsAction {
    /// List stored log entries, oldest first
    List,
    /// Write all logs as a plain-text transcript
    Export {
        /// Directory to write the transcript into (default: current directory)
        #[arg(short = 'o', long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Drop entries older than the retention period
    Cleanup {
        /// Days to keep (default: the configured retention)
        #[arg(short = 'd', long)]
        days: Option<u32>,
    },
    /// Delete every log entry
    Clear,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LimitsAction {
    /// Show every active rate limit window
    Stats,
    /// Show the remaining quota for one identifier without consuming it
    Check { identifier: String },
    /// Reset one identifier, or every identifier when none is given
    Clear { identifier: Option<String> },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing("warn");
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut stdout = io::stdout();
    run(args, &mut stdout)
}

/// Loads the config file named by `args`, applying command-line overrides.
pub fn load_config(args: &Args) -> Result<(PathBuf, Config), Box<dyn Error>> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(Config::default_config_path);
    let mut config = Config::load_from_path(&config_path)?;
    if let Some(dir) = &args.storage_dir {
        config.storage_dir = Some(dir.clone());
    }
    debug!(path = %config_path.display(), "Loaded configuration");
    Ok((config_path, config))
}

/// Executes `args`, writing command output to `out`.
pub fn run(args: Args, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let (config_path, config) = load_config(&args)?;

    if let Commands::Config { init } = args.command {
        if init {
            if config_path.exists() {
                writeln!(
                    out,
                    "Configuration already exists at {}",
                    home_relative(&config_path)
                )?;
            } else {
                Config::default().save_to_path(&config_path)?;
                writeln!(out, "✅ Wrote {}", home_relative(&config_path))?;
            }
        } else {
            config.print_all();
        }
        return Ok(());
    }

    if let Commands::Format {
        persona,
        length,
        text,
    } = &args.command
    {
        return run_format(&config, persona, length.as_deref(), text, out);
    }

    let mut session = Session::open(&config)?;
    session.start_background();

    let result = match args.command {
        Commands::Say {
            persona,
            identifier,
            reply,
            prompt,
        } => run_say(&mut session, &persona, &identifier, &prompt, &reply, out),
        Commands::History {
            persona,
            clear,
            clear_all,
        } => run_history(&session, persona.as_deref(), clear, clear_all, out),
        Commands::Logs { action } => run_logs(&session, action, out),
        Commands::Limits { action } => run_limits(&session, action, out),
        Commands::Config { .. } | Commands::Format { .. } => Ok(()),
    };

    session.shutdown();
    result
}
