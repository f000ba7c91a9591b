//! Get row command

use crate::app::{GetArgs, OutputFormat};
use crate::output;
use anyhow::Result;
use datasift_core::SearchService;

pub fn run(args: GetArgs, service: &SearchService, format: OutputFormat) -> Result<()> {
    let row = service.get(args.id)?;
    print!("{}", output::format_record(&row, service.schema(), format));
    Ok(())
}
