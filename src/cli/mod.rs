//! Command-line interface for gatehouse.

use clap::{Parser, Subcommand};

/// gatehouse - account, session and avatar service
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP API (default)
    #[command(alias = "-d", alias = "--daemon")]
    Serve,

    /// Write a default config.toml if none exists
    Init,

    /// Validate config and connect to the database, cache and object store
    #[command(alias = "-c", alias = "--check")]
    Check,
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["gatehouse"]);
        assert_eq!(cli.command(), Commands::Serve);
    }

    #[test]
    fn parses_subcommands() {
        assert_eq!(Cli::parse_from(["gatehouse", "init"]).command(), Commands::Init);
        assert_eq!(Cli::parse_from(["gatehouse", "check"]).command(), Commands::Check);
    }
}
