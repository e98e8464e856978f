mod search;

pub use search::run_search;

use clap::{Parser, Subcommand};

/// OSINT broker - cancellable per-channel lookups over WebSocket
#[derive(Parser)]
#[command(name = "osint-broker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// List the registered search modules
    Modules,

    /// Run one search in-process and print its events as JSON lines
    Search {
        /// Module name or alias (e.g. whois, username, github)
        module: String,

        /// Query passed to the module
        query: String,

        /// Channel topic; defaults to the module name
        #[arg(short, long)]
        topic: Option<String>,
    },
}
