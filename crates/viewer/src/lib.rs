//! impview - terminal viewer for impostor event logs
//!
//! Talks to the impview file access service over HTTP and renders log files
//! in the terminal, either once or continuously while the file grows.

use clap::{CommandFactory, Parser, Subcommand};

mod cli;
pub mod client;
pub mod render;
pub mod watcher;

pub use client::{ApiClient, ClientError, DEFAULT_SERVER, LogSource};
pub use render::RenderOptions;
pub use watcher::{WatchHandle, WatchState};

#[derive(Parser)]
#[command(
    name = "impview",
    version,
    about = "Serve and follow impostor event logs from the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the file access service
    Serve(impview_server::ServeArgs),
    /// Follow a log file, redrawing whenever it changes
    Watch(cli::watch::WatchArgs),
    /// Fetch and print a log file once
    Show(cli::show::ShowArgs),
    /// Print a log file's freshness marker
    Status(cli::status::StatusArgs),
}

/// Parse `args` (program name first) and run the chosen command.
///
/// Returns the process exit code.
pub async fn run_cli(args: Vec<String>) -> i32 {
    match Cli::try_parse_from(args) {
        Ok(cli) => match cli.command {
            Some(Commands::Serve(args)) => cli::serve::run(args).await,
            Some(Commands::Watch(args)) => cli::watch::run(args).await,
            Some(Commands::Show(args)) => cli::show::run(args).await,
            Some(Commands::Status(args)) => cli::status::run(args).await,
            None => {
                let mut cmd = Cli::command();
                let _ = cmd.print_help();
                println!();
                0
            }
        },
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            code
        }
    }
}
