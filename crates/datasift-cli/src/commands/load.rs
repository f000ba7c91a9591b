//! Load command

use crate::app::{LoadArgs, OutputFormat};
use crate::output::json;
use anyhow::Result;
use datasift_core::{Config, CsvLoader, DatasetLoader};
use std::path::Path;

pub fn run(args: LoadArgs, mut config: Config, config_path: &Path, format: OutputFormat) -> Result<()> {
    let loader = CsvLoader::new(args.csv.clone(), config.database_path.clone(), config.dataset);
    let snapshot = loader.load()?;

    if args.save {
        config.source_csv = Some(std::fs::canonicalize(&args.csv).unwrap_or(args.csv));
        config.save_to(config_path)?;
        tracing::info!("Saved refresh source to {}", config_path.display());
    }

    match format {
        OutputFormat::Json => print!("{}", json::to_pretty(&snapshot)),
        _ => {
            println!("Dataset:     {}", snapshot.kind);
            println!("Rows:        {}", snapshot.row_count);
            println!("Database:    {}", snapshot.database_path.display());
            if let Some(fp) = &snapshot.fingerprint {
                println!("Fingerprint: {}", fp);
            }
        }
    }
    Ok(())
}
