//! `impview watch`: follow a log file and redraw on every change.
//!
//! On a terminal, single keys steer the watcher: `r` refetches now, `f`
//! prompts for another file and `q` quits.

use clap::Args;
use console::{Key, Style, Term};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::{DisplayArgs, TargetArgs, run_cli_async};
use crate::client::ApiClient;
use crate::render::render_state;
use crate::watcher::{self, WatchState};

const KEY_HELP: &str = "Keys: r refresh, f change file, q quit";

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[command(flatten)]
    pub display: DisplayArgs,
    #[arg(
        short = 'i',
        long = "interval-ms",
        value_name = "MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "How often to check the file for changes"
    )]
    pub interval_ms: u64,
    #[arg(long = "no-clear", help = "Append each redraw instead of clearing the screen")]
    pub no_clear: bool,
}

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Refresh,
    ChangeFile,
    Quit,
}

/// Messages from the keyboard thread to the redraw loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Refresh,
    Quit,
    /// A file prompt is open; redraws would overwrite it.
    Editing,
    /// The prompt closed; `None` when nothing usable was typed.
    File(Option<String>),
}

fn command_for(key: &Key) -> Option<Command> {
    match key {
        Key::Char('r' | 'R') => Some(Command::Refresh),
        Key::Char('f' | 'F') => Some(Command::ChangeFile),
        Key::Char('q' | 'Q') | Key::Escape | Key::CtrlC => Some(Command::Quit),
        _ => None,
    }
}

/// File name typed at the prompt, trimmed; blank input keeps the current file.
fn file_from_line(line: &str) -> Option<String> {
    let file = line.trim();
    (!file.is_empty()).then(|| file.to_string())
}

/// Run `impview watch`, returning the process exit code.
pub async fn run(args: WatchArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: WatchArgs) -> Result<(), String> {
    let client = ApiClient::new(&args.target.server).map_err(|e| e.to_string())?;
    let options = args.display.options(client.base());
    let interval = Duration::from_millis(args.interval_ms);

    let handle = watcher::spawn(Arc::new(client), args.target.file.clone(), interval);
    let mut states = handle.subscribe();
    let term = Term::stdout();
    let interactive = term.is_term();
    let redraw = !args.no_clear && interactive;

    let (input_tx, mut inputs) = mpsc::channel(8);
    if interactive {
        read_keys(term.clone(), input_tx);
    } else {
        drop(input_tx);
    }

    let draw = |state: &WatchState| {
        if redraw {
            let _ = term.clear_screen();
        }
        println!("{}", render_state(state, &options));
        if interactive {
            println!("{}", Style::new().dim().apply_to(KEY_HELP));
        }
    };

    let mut editing = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "Failed to listen for Ctrl+C.");
                }
                debug!("Stopping watcher.");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if !editing {
                    draw(&state);
                }
            }
            Some(input) = inputs.recv(), if interactive => {
                match input {
                    Input::Refresh => handle.refresh(),
                    Input::Quit => break,
                    Input::Editing => editing = true,
                    Input::File(file) => {
                        editing = false;
                        match file {
                            Some(file) => handle.set_file(file),
                            None => draw(&handle.current()),
                        }
                    }
                }
            }
        }
    }

    handle.stop().await;
    Ok(())
}

/// Forward key presses to the redraw loop from a blocking thread.
///
/// The thread ends when the loop stops listening or the terminal fails.
fn read_keys(term: Term, inputs: mpsc::Sender<Input>) {
    std::thread::spawn(move || {
        loop {
            let key = match term.read_key() {
                Ok(key) => key,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    let _ = inputs.blocking_send(Input::Quit);
                    return;
                }
                Err(err) => {
                    debug!(error = %err, "Stopped reading keys.");
                    return;
                }
            };

            let input = match command_for(&key) {
                None => continue,
                Some(Command::Refresh) => Input::Refresh,
                Some(Command::Quit) => Input::Quit,
                Some(Command::ChangeFile) => {
                    if inputs.blocking_send(Input::Editing).is_err() {
                        return;
                    }
                    let line = term
                        .write_str("File to watch: ")
                        .and_then(|()| term.read_line());
                    match line {
                        Ok(line) => Input::File(file_from_line(&line)),
                        Err(err) => {
                            debug!(error = %err, "Failed to read file name.");
                            Input::File(None)
                        }
                    }
                }
            };
            if inputs.blocking_send(input).is_err() {
                return;
            }
        }
    });
}
