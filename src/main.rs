// KeyProbe - Local Weak Password Auditor
//
// Enumerates accounts with a login shell and tries a short list of
// username-derived passwords against each of them through su.

mod candidates;
mod checker;
mod cli;
mod config;
mod discovery;
mod logger;
mod prober;
mod report;
mod runner;
mod safety;
mod session;

use clap::Parser;
use cli::{Cli, Commands};
use config::Overrides;
use log::{error, info};
use runner::{AuditOptions, RunError};
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logger::init_logger(cli.debug);

    info!("Starting KeyProbe v{}", env!("CARGO_PKG_VERSION"));

    match run_command(cli).await {
        Ok(_) => {
            info!("KeyProbe v{} completed successfully", env!("CARGO_PKG_VERSION"));
            process::exit(0);
        }
        Err(e) => {
            error!("KeyProbe failed: {e}");
            process::exit(e.exit_code());
        }
    }
}

async fn run_command(cli: Cli) -> Result<(), RunError> {
    match cli.command {
        Commands::Audit { sources, users, timeout, workers, allow_root } => {
            let options = AuditOptions {
                config_path: sources.config.clone(),
                overrides: Overrides {
                    timeout_seconds: timeout,
                    workers,
                    ..sources.overrides()
                },
                users,
                allow_root,
            };
            runner::run_audit(options).await.map(|_| ())
        }
        Commands::Accounts { sources } => {
            runner::list_accounts_command(sources.config.clone(), sources.overrides())
        }
        Commands::Candidates { username, config } => {
            runner::list_candidates_command(&username, config)
        }
    }
}
