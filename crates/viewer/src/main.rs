//! impview - CLI entry point

#[tokio::main]
async fn main() {
    impview_common::logging::init_tracing();

    let code = impview::run_cli(std::env::args().collect()).await;
    std::process::exit(code);
}
