//! impview-server - standalone file access service binary
//!
//! Serves log files and images from the allowed roots until Ctrl+C.

use clap::Parser;
use impview_server::ServeArgs;

#[derive(Parser)]
#[command(
    name = "impview-server",
    version,
    about = "Read-only HTTP access to impostor event logs"
)]
struct Args {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() {
    impview_common::logging::init_tracing();

    let args = Args::parse();
    let result = match args.serve.into_config() {
        Ok(config) => impview_server::run_server(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
