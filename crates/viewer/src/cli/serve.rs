//! `impview serve`: run the file access service in the foreground.

use impview_server::ServeArgs;

use crate::cli::run_cli_async;

pub async fn run(args: ServeArgs) -> i32 {
    run_cli_async(|| async move {
        let config = args.into_config()?;
        impview_server::run_server(config).await
    })
    .await
}
