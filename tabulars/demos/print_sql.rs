use std::{env, fs, path::PathBuf};

use tabula::{PreviewRequest, ReportCompiler, TabulaConfig};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: print_sql <request_json>");
    eprintln!(
        "Example: cargo run --example print_sql -- demos/requests/points_by_agency.json"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        usage();
        std::process::exit(1);
    }
    let request_path = PathBuf::from(args.remove(0));

    let config = TabulaConfig::load_default();
    let registry = config.load_registry()?;
    let compiler = ReportCompiler::from_config(registry, &config.compiler);

    let request_str = fs::read_to_string(request_path)?;
    let request: PreviewRequest = serde_json::from_str(&request_str)?;

    let compiled = compiler.compile(&request.source_table, &request.config)?;
    println!("{}", compiled.sql);
    println!("{}", serde_json::to_string(&compiled.params)?);
    Ok(())
}
