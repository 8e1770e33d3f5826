use clap::Parser;
use hondana::cli::{Cli, init_tracing, run};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "hondana failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        },
    }
}
