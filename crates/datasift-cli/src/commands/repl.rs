//! Interactive query prompt
//!
//! Plain lines are natural-language queries. Lines starting with `:` are
//! commands, see `:help`.

use crate::app::OutputFormat;
use crate::output;
use anyhow::{Context, Result};
use datasift_core::{DataSiftError, SearchService};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Type a question to search the dataset.

  :find <text>    keyword search
  :get <id>       show one row
  :agent <text>   ask the analysis agent
  :status         service status
  :reload         reload the dataset now
  :quit           leave
";

pub async fn run(service: SearchService, format: OutputFormat) -> Result<()> {
    let service = Arc::new(service);
    let refresher = service
        .config()
        .refresh_interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| Arc::clone(&service).spawn_refresh(Duration::from_secs(secs)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("datasift> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, ":quit" | ":exit" | ":q") {
            break;
        }

        if let Err(e) = handle(line, &service, format).await {
            eprintln!("error: {:#}", e);
        }
    }

    if let Some(handle) = refresher {
        handle.abort();
    }
    Ok(())
}

async fn handle(line: &str, service: &SearchService, format: OutputFormat) -> Result<()> {
    let (command, rest) = match line.strip_prefix(':') {
        Some(cmd) => cmd.split_once(' ').unwrap_or((cmd, "")),
        None => {
            let response = service.query(line).await.with_context(|| line.to_string())?;
            print!("{}", output::format_query(&response, service.schema(), format));
            return Ok(());
        }
    };
    let rest = rest.trim();

    match command {
        "help" | "h" => print!("{}", HELP),
        "find" => {
            let page = service
                .text_search(rest, service.first_page())
                .with_context(|| rest.to_string())?;
            print!("{}", output::format_page(&page, service.schema(), format));
        }
        "get" => {
            let id: i64 = rest
                .parse()
                .map_err(|_| DataSiftError::InvalidInput(format!("'{}' is not a row id", rest)))?;
            let row = service.get(id)?;
            print!("{}", output::format_record(&row, service.schema(), format));
        }
        "agent" => {
            let agent = super::agent::build(service, None)?;
            let response = agent.run(rest).await.with_context(|| rest.to_string())?;
            print!("{}", output::format_agent(&response, format));
        }
        "status" => super::status::run(service, format)?,
        "reload" => {
            let snapshot = service.refresh()?;
            println!("Reloaded {} rows", snapshot.row_count);
        }
        other => {
            return Err(DataSiftError::InvalidInput(format!(
                "Unknown command ':{}', try :help",
                other
            ))
            .into())
        }
    }
    Ok(())
}
