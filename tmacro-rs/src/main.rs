use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tmacro::cli::{self, ConfigFile, Source, USAGE};
use tmacro::config::Config;
use tmacro::script::{ExecutionState, FunctionRegistry, Interpreter, Invocation};
use tmacro::sink::TerminalSink;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tmacro: {e}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    // Logs go to stderr so stdout carries only the render.
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let path = match args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path),
        ConfigFile::Search => cli::find_user_config(),
    };
    let config = match path {
        None => Config::default(),
        Some(path) => match Config::load_file(&path) {
            Ok((config, errors)) => {
                for e in errors {
                    eprintln!("tmacro: {}: {e}", path.display());
                }
                config
            }
            Err(e) => {
                eprintln!("tmacro: warning: {}: {e}", path.display());
                Config::default()
            }
        },
    };
    tracing::debug!(?config, "configuration loaded");

    // ── Document ──────────────────────────────────────────────────────────────
    let (command, source) = match args.source {
        Source::Inline(doc) => ("-c".to_owned(), Ok(doc)),
        Source::File(path) => (path.display().to_string(), tokio::fs::read_to_string(&path).await),
        Source::Stdin => {
            let mut buf = String::new();
            let read = tokio::io::stdin().read_to_string(&mut buf).await;
            ("-".to_owned(), read.map(|_| buf))
        }
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tmacro: {command}: {e}");
            std::process::exit(2);
        }
    };

    // ── Evaluate ──────────────────────────────────────────────────────────────
    let interp = Interpreter::from_config(Arc::new(FunctionRegistry::with_builtins()), &config);
    let state = ExecutionState::with_timezone(config.timezone.clone());
    let sink = TerminalSink::new(config.color);
    let result = interp
        .run(&source, Invocation::new(command, args.caller_args), state, &sink, &sink)
        .await;

    if result.error {
        std::process::exit(1);
    }
}
