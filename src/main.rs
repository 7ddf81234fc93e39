use anyhow::{bail, Context, Result};
use std::env;
use std::io::Read;

use data_pipeline::{count_records, init_tracing, Config, Pipeline, RawInput, StoreSink};

const USAGE: &str = "usage:
  data-pipeline init-db
  data-pipeline stats
  data-pipeline <store|sheets|pdf> <source> [text-file]   (text read from stdin when no file is given)";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::from_env().context("Failed to load configuration")?;

    match args.first().map(String::as_str) {
        Some("init-db") => run_init_db(&config),
        Some("stats") => run_stats(&config),
        Some(op @ ("store" | "sheets" | "pdf")) => {
            let source = args.get(1).context(USAGE)?;
            let text = read_text(args.get(2).map(String::as_str))?;
            run_operation(&config, op, RawInput::new(source.as_str(), text)).await
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn run_init_db(config: &Config) -> Result<()> {
    let location = config.database_path()?;
    StoreSink::open(&location)?;
    println!("✓ clean_records ready at {}", config.database_url);
    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let store = StoreSink::open(&config.database_path()?)?;
    let count = store.with_connection(count_records)?;
    println!("✓ clean_records contains {} rows", count);
    Ok(())
}

async fn run_operation(config: &Config, op: &str, input: RawInput) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;

    let status = match op {
        "store" => serde_json::to_value(pipeline.clean_and_store(&input).await?)?,
        "sheets" => serde_json::to_value(pipeline.clean_and_export_to_sheet(&input).await?)?,
        "pdf" => serde_json::to_value(pipeline.clean_and_render_to_pdf(&input).await?)?,
        other => bail!("unknown operation '{}'", other),
    };

    println!("{}", status);
    Ok(())
}

fn read_text(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path)),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read text from stdin")?;
            Ok(text)
        }
    }
}
