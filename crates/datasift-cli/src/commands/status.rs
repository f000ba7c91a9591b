//! Status command

use crate::app::OutputFormat;
use crate::output::json;
use anyhow::Result;
use datasift_core::SearchService;

pub fn run(service: &SearchService, format: OutputFormat) -> Result<()> {
    let status = service.status();

    match format {
        OutputFormat::Json => print!("{}", json::to_pretty(&status)),
        _ => {
            println!("Status:          {}", status.status);
            println!("Dataset:         {}", status.dataset);
            println!("Database:        {}", status.database.display());
            println!("Rows:            {}", status.row_count);
            println!("Loaded at:       {}", status.loaded_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(fp) = &status.fingerprint {
                println!("Fingerprint:     {}", fp);
            }
            println!("LLM extraction:  {}", if status.llm_configured { "on" } else { "off" });
            if let Some(llm) = &status.llm_metrics {
                println!(
                    "LLM requests:    {} ({} failed, {:.0}ms avg)",
                    llm.total_requests, llm.total_errors, llm.avg_latency_ms
                );
            }
            println!();
            println!("Cache:");
            println!(
                "  Entries:       {} active, {} expired",
                status.cache.active_entries, status.cache.expired_entries
            );
            println!("  Hits:          {}", status.cache.hits);
            println!("  Misses:        {}", status.cache.misses);
        }
    }
    Ok(())
}
