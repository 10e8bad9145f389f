use argh::FromArgs;
use flapjack::env::Environment;
use flapjack::terminal::RawTerminal;
use flapjack::{Console, ExternalLauncher, Shell};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Run a script, or start an interactive session when no file is given.
#[derive(FromArgs)]
struct Cli {
    /// script to execute
    #[argh(positional)]
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .init();

    let cli: Cli = argh::from_env();

    let mut env = Environment::new();
    if let Some(program) = std::env::args_os().next() {
        env.set_var("SHELL", program);
    }

    match cli.file {
        Some(path) => {
            let mut shell = Shell::new(env, Box::new(ExternalLauncher::new()), Console::stdio(None));
            match shell.run_file(&path) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        None => {
            let terminal = match RawTerminal::enable() {
                Ok(terminal) => terminal,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let console = Console::stdio(Some(terminal));
            let mut shell = Shell::new(env, Box::new(ExternalLauncher::new()), console);
            let result = shell.run_interactive(&mut std::io::stdin().lock());
            // Leave raw mode before printing anything.
            drop(shell);
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
