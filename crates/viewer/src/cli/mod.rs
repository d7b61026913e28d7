//! Subcommand implementations.

use clap::Args;
use url::Url;

use crate::client::DEFAULT_SERVER;
use crate::render::RenderOptions;

pub mod serve;
pub mod show;
pub mod status;
pub mod watch;

/// Log file shown when none is named.
pub const DEFAULT_FILE: &str = "events.json";

/// Run a command body and turn its outcome into an exit code, printing the
/// error to stderr.
pub async fn run_cli_async<F, Fut>(f: F) -> i32
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    match f().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

/// Which file on which server.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(
        value_name = "FILE",
        default_value = DEFAULT_FILE,
        help = "Log file, relative to the server's log root or absolute"
    )]
    pub file: String,
    #[arg(
        short = 's',
        long = "server",
        value_name = "URL",
        default_value = DEFAULT_SERVER,
        help = "Base URL of the file access service"
    )]
    pub server: String,
}

/// Layout flags shared by `watch` and `show`.
#[derive(Args, Debug, Clone)]
pub struct DisplayArgs {
    #[arg(short = 'e', long = "expand", help = "Show prompts and responses in full")]
    pub expand: bool,
    #[arg(
        short = 'n',
        long = "limit",
        value_name = "N",
        help = "Show only the newest N entries"
    )]
    pub limit: Option<usize>,
}

impl DisplayArgs {
    pub fn options(&self, server: &Url) -> RenderOptions {
        RenderOptions {
            expand: self.expand,
            limit: self.limit,
            image_base: Some(server.clone()),
        }
    }
}
