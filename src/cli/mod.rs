//! CLI module for the USSD service
//!
//! Provides commands:
//! - `serve`: Africa's Talking HTTP endpoint
//! - `repl`: drive one session from the terminal
//! - `restart-state`: put a session back at the root node

use clap::{Parser, Subcommand};

pub mod repl;
pub mod restart_state;

/// USSD menu service CLI
#[derive(Parser, Debug)]
#[command(name = "ussd")]
#[command(about = "USSD menu session service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,
    /// Interactive terminal session
    Repl {
        /// Session id, normally the caller's phone number
        #[arg(long, default_value = "254700000000")]
        session_id: String,
    },
    /// Reset a session's durable state to the root node
    RestartState {
        /// Session id to reset
        #[arg(long)]
        session_id: String,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Repl { session_id }) => repl::run(&session_id).await,
        Some(Commands::RestartState { session_id }) => restart_state::run(&session_id).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repl_default_session() {
        let cli = Cli::try_parse_from(["ussd", "repl"]).unwrap();
        match cli.command {
            Some(Commands::Repl { session_id }) => assert_eq!(session_id, "254700000000"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_restart_state_requires_session() {
        assert!(Cli::try_parse_from(["ussd", "restart-state"]).is_err());
        let cli = Cli::try_parse_from(["ussd", "restart-state", "--session-id", "254711000000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::RestartState { .. })));
    }
}
