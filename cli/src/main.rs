mod commands;
mod config;
mod logging;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    cmd_add, cmd_eat, cmd_export, cmd_history, cmd_import, cmd_list, cmd_pick, cmd_remove,
};
use crate::config::Config;
use tonight_core::service::{SystemClock, TonightService};

#[derive(Parser)]
#[command(
    name = "tonight",
    version,
    about = "Pick what to eat tonight",
    long_about = "Pick what to eat tonight.\n\n\
        Meals eaten in the last 30 days are ten times less likely to come up."
)]
struct Cli {
    /// Log debug diagnostics to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a meal to the list
    Add {
        /// Meal name (case-sensitive)
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal from the list (history is kept)
    Remove {
        /// Exact meal name
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals with their current weight
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest a meal for tonight
    Pick {
        /// Record the suggestion without asking
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON (only records with --yes)
        #[arg(long)]
        json: bool,
    },
    /// Record a meal as eaten now
    Eat {
        /// Meal name
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show meals eaten in the last 30 days
    History {
        /// Show the full log instead
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export meals and history as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Merge meals and history from an export file
    Import {
        /// Path to the JSON export
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: could not initialise logging: {e:#}");
    }

    if let Err(e) = run(cli).await {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = TonightService::new(&config.db_path)?;
    let clock = SystemClock;

    match cli.command {
        Commands::Add { meal, json } => cmd_add(&svc, &meal, json),
        Commands::Remove { meal, json } => cmd_remove(&svc, &meal, json),
        Commands::List { json } => cmd_list(&svc, &clock, json),
        Commands::Pick { yes, json } => cmd_pick(&svc, &clock, yes, json),
        Commands::Eat { meal, json } => cmd_eat(&svc, &clock, &meal, json),
        Commands::History { all, json } => cmd_history(&svc, &clock, all, json),
        Commands::Export { output } => cmd_export(&svc, output.as_deref()),
        Commands::Import {
            file,
            dry_run,
            json,
        } => cmd_import(&svc, &clock, &file, dry_run, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(svc, port, &bind, api_key).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pick_flags_parse() {
        let cli = Cli::try_parse_from(["tonight", "pick", "--yes", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Pick {
                yes: true,
                json: true
            }
        ));
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["tonight", "list", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["tonight", "serve"]).unwrap();
        match cli.command {
            Commands::Serve {
                port,
                bind,
                no_auth,
            } => {
                assert_eq!(port, 8080);
                assert_eq!(bind, "127.0.0.1");
                assert!(!no_auth);
            }
            _ => panic!("expected serve"),
        }
    }
}
