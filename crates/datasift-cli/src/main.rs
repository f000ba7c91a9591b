//! DataSift CLI
//!
//! Natural language search over news, movie and review datasets.

use anyhow::Result;
use clap::Parser;
use datasift_core::error::exit_codes;
use datasift_core::{Config, DataSiftError, SearchService};
use std::process::ExitCode;

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<DataSiftError>()
                .map(DataSiftError::exit_code)
                .unwrap_or(exit_codes::GENERAL_ERROR);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_from(&config_path)?;

    if let Some(kind) = cli.dataset {
        config.dataset = kind;
    }
    if let Some(db) = cli.db.clone() {
        config.database_path = db;
    }

    let format = cli.format;
    match cli.command {
        Commands::Load(args) => commands::load::run(args, config, &config_path, format),
        Commands::Search(args) => commands::search::run(args, &SearchService::open(config)?, format),
        Commands::Find(args) => commands::search::run_find(args, &SearchService::open(config)?, format),
        Commands::Get(args) => commands::get::run(args, &SearchService::open(config)?, format),
        Commands::Query(args) => {
            commands::query::run(args, &SearchService::open(config)?, format).await
        }
        Commands::Agent(args) => {
            commands::agent::run(args, &SearchService::open(config)?, format).await
        }
        Commands::Status => commands::status::run(&SearchService::open(config)?, format),
        Commands::Repl => commands::repl::run(SearchService::open(config)?, format).await,
    }
}
