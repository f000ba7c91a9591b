//! CLI command handlers

pub mod agent;
pub mod get;
pub mod load;
pub mod query;
pub mod repl;
pub mod search;
pub mod status;
