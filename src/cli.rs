//! Command line interface built on clap.
//!
//! [`Cli`] carries the global flags (`--config`, `--verbose`) and one
//! [`Command`]: check, simulate or cooldowns.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// stagehand: schedules state-machine driven automation actions.
#[derive(Debug, Parser)]
#[command(name = "stagehand", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./stagehand.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load and validate the configuration, then print the effective policy.
    Check,

    /// Rehearse the schedule with every configured action, without running any.
    Simulate {
        /// Stop after a single pass.
        #[arg(long)]
        once: bool,
    },

    /// Print a persisted cooldown snapshot.
    Cooldowns {
        /// JSON snapshot file.
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_simulate_subcommand() {
        let cli = Cli::parse_from(["stagehand", "simulate", "--once"]);
        match cli.command {
            Command::Simulate { once } => assert!(once),
            _ => panic!("expected Simulate command"),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "stagehand",
            "--config",
            "bot.toml",
            "--verbose",
            "check",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config.unwrap(), PathBuf::from("bot.toml"));
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn cli_parses_cooldowns_subcommand() {
        let cli = Cli::parse_from(["stagehand", "cooldowns", "--snapshot", "state/cd.json", "-v"]);
        match cli.command {
            Command::Cooldowns { snapshot } => {
                assert_eq!(snapshot, PathBuf::from("state/cd.json"));
            }
            _ => panic!("expected Cooldowns command"),
        }
        assert!(cli.verbose);
    }

    #[test]
    fn cooldowns_requires_snapshot() {
        assert!(Cli::try_parse_from(["stagehand", "cooldowns"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
