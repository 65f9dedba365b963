use anyhow::Result;
use clap::Parser;
use inventory_enrich::cli::{run, RootArgs};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // A missing .env file is normal outside development.
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(RootArgs::parse())
}
