use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    init_tracing();
    lshash_store::run(lshash_store::Cli::parse())
}

/// Logs go to stderr so stdout stays machine-readable. `LSHSTORE_LOG` takes
/// the usual `EnvFilter` directives (e.g. `lshash_store=debug`).
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LSHSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
