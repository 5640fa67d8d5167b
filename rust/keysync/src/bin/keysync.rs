use std::process::ExitCode;

use clap::Parser;
use keysync::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let reconciler = match config.reconciler() {
        Ok(reconciler) => reconciler,
        Err(error) => {
            eprintln!("{error:#}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = reconciler
        .run_exclusive(config.lock_file.as_deref())
        .await;

    if outcome.succeeded {
        println!("{}", outcome.detail);
        ExitCode::SUCCESS
    } else {
        eprintln!("{}", outcome.detail);
        ExitCode::FAILURE
    }
}
