use clap::Parser;
use pantry_cache::CacheError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod inventory;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = inventory::Cli::parse();
    match inventory::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = match err.downcast_ref::<CacheError>() {
                Some(cache_err) => cache_err.user_message(),
                None => format!("{err:#}"),
            };
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
