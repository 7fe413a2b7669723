use std::{env, fs, path::PathBuf, sync::Arc};

use tabula::{DuckDbRunner, PreviewRequest, ReportCompiler, ReportExecutor, TabulaConfig};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: run_report <duckdb_file> <request_json>");
    eprintln!(
        "Example: cargo run --example run_report -- shop.duckdb demos/requests/points_by_agency.json"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }
    let db_path = PathBuf::from(args.remove(0));
    let request_path = PathBuf::from(args.remove(0));

    let config = TabulaConfig::load_default();
    let compiler = ReportCompiler::from_config(config.load_registry()?, &config.compiler);
    let runner = DuckDbRunner::new(db_path).with_max_concurrency(config.duckdb.max_concurrency);
    let executor = ReportExecutor::new(compiler, Arc::new(runner));

    let request: PreviewRequest = serde_json::from_str(&fs::read_to_string(request_path)?)?;
    let rows = executor.preview(&request).await?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
