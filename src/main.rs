mod cli;
mod config;
mod error;
mod index;
mod install;
mod launch;
mod locate;
mod plan;
mod scan;
mod snapshot;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("balmora=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cli::run()
}
