mod cli;
mod config;
mod engine;
mod error;
mod logging;
mod model;
mod orchestrator;
mod progress;
mod scenario;
mod system_check;
mod text_summary;
mod wizard;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse_args();

    let code = match cli::run(args).await {
        Ok(code) => code,
        // already logged by `cli::run`; only the exit code is left to report
        Err(e) => e.exit_code(),
    };
    std::process::exit(code);
}
