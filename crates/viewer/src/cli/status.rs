//! `impview status`: print when a log file last changed.

use clap::Args;

use crate::cli::{TargetArgs, run_cli_async};
use crate::client::ApiClient;
use crate::render::format_timestamp;

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn run(args: StatusArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: StatusArgs) -> Result<(), String> {
    let client = ApiClient::new(&args.target.server).map_err(|e| e.to_string())?;
    let status = client
        .status(&args.target.file)
        .await
        .map_err(|e| format!("Failed to check {}: {e}", args.target.file))?;

    let modified = format_timestamp(status.last_modified as f64 / 1000.0);
    println!("{} last modified {modified} ({})", args.target.file, status.last_modified);
    Ok(())
}
