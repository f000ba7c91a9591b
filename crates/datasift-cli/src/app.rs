//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use datasift_core::DatasetKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datasift")]
#[command(
    author,
    version,
    about = "Natural language search over news, movie and review datasets"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Dataset variant (news, movies, reviews)
    #[arg(long, global = true, env = "DATASIFT_DATASET", value_parser = parse_dataset)]
    pub dataset: Option<DatasetKind>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true, env = "DATASIFT_DB")]
    pub db: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the database from a CSV export
    Load(LoadArgs),

    /// Browse with structured filters
    Search(SearchArgs),

    /// Keyword search over the text columns
    Find(FindArgs),

    /// Show one row by primary key
    Get(GetArgs),

    /// Answer a natural-language query
    Query(QueryArgs),

    /// Run the tool-calling analysis agent
    Agent(AgentArgs),

    /// Show service status
    Status,

    /// Interactive query prompt
    Repl,
}

#[derive(Args)]
pub struct LoadArgs {
    /// CSV file to load
    pub csv: PathBuf,

    /// Remember the CSV as the refresh source in the config file
    #[arg(long)]
    pub save: bool,
}

#[derive(Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Rows per page
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Category filter
    #[arg(short, long)]
    pub category: Option<String>,

    /// Keyword filter
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Additional filter as field=value (repeatable)
    #[arg(short, long = "filter", value_name = "FIELD=VALUE")]
    pub filters: Vec<String>,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args)]
pub struct FindArgs {
    /// Search text
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args)]
pub struct GetArgs {
    /// Primary key of the row
    pub id: i64,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Query text
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,
}

#[derive(Args)]
pub struct AgentArgs {
    /// Question for the agent
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Step cap (overrides the config file)
    #[arg(long)]
    pub max_iterations: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
    Csv,
    Md,
}

fn parse_dataset(s: &str) -> Result<DatasetKind, String> {
    s.parse().map_err(|e: datasift_core::DataSiftError| e.to_string())
}
