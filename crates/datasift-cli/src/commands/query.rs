//! Natural-language query command

use crate::app::{OutputFormat, QueryArgs};
use crate::output;
use anyhow::{Context, Result};
use datasift_core::SearchService;

pub async fn run(args: QueryArgs, service: &SearchService, format: OutputFormat) -> Result<()> {
    let text = args.text.join(" ");
    let response = service.query(&text).await.with_context(|| text.clone())?;
    print!("{}", output::format_query(&response, service.schema(), format));
    Ok(())
}
