//! CLI surface for the daemon binary.

use std::ffi::OsString;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::{self, ConfigError};
use crate::daemon::run_daemon;
use crate::Result;

#[derive(Parser, Debug)]
#[command(
    name = "rewarmd",
    version,
    about = "Background reconciliation daemon for derived content caches",
    arg_required_else_help = true
)]
pub struct Cli {
    /// More logging (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the reconciliation loop. Exits only on displacement, a refused
    /// takeover, a shutdown signal, or an unrecoverable store error.
    Run {
        /// Seize leadership even if the previous heartbeat still looks
        /// live (operator restart after a crash).
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Config,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { force } => run_daemon(force),
        Command::Config => {
            let cfg = config::load_or_init();
            let rendered = toml::to_string_pretty(&cfg).map_err(|e| ConfigError::Write {
                path: config::config_path(),
                reason: e.to_string(),
            })?;
            print!("{rendered}");
            Ok(())
        }
    }
}
