//! Command line arguments
//!
//! - biblio-server [serve]
//! - biblio-server create-superuser --username <name> --password <pwd> [--email <email>]

use clap::{Parser, Subcommand};

/// Biblio - library catalog and loans server
#[derive(Parser, Debug)]
#[command(name = "biblio-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Create an account with staff and superuser rights
    CreateSuperuser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        password: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Subcommand to run, `serve` when none is given
    pub fn command(self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}
