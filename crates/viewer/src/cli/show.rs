//! `impview show`: print a log file once.

use clap::Args;

use crate::cli::{DisplayArgs, TargetArgs, run_cli_async};
use crate::client::ApiClient;
use crate::render::render_view;

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub display: DisplayArgs,
}

pub async fn run(args: ShowArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: ShowArgs) -> Result<(), String> {
    let client = ApiClient::new(&args.target.server).map_err(|e| e.to_string())?;
    let response = client
        .logs(&args.target.file)
        .await
        .map_err(|e| format!("Failed to load {}: {e}", args.target.file))?;

    let options = args.display.options(client.base());
    print!("{}", render_view(&response.records, None, true, &options));
    Ok(())
}
