//! Command-line argument parsing.
//!
//! Usage:
//!   tmacro [-d] [-f[<file>]] [-c<document>] [<file>] [-- args...]
//!
//! The document comes from `-c`, else the first positional argument, else
//! stdin (`-` also means stdin).  Remaining positionals and everything after
//! `--` become the caller arguments seen by `$args`.

use std::path::PathBuf;

pub const USAGE: &str = "Usage: tmacro [-d] [-f[<file>]] [-c<document>] [<file>] [-- args...]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Where the document comes from.
    pub source: Source,
    /// Arguments passed through to the invocation context.
    pub caller_args: Vec<String>,
    /// Debug logging (`-d`).
    pub debug: bool,
}

/// How to choose the config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Search the per-user config dir, then `./tmacro.conf` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the config file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

/// Where to read the document from.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Source {
    #[default]
    Stdin,
    /// `-c<document>`.
    Inline(String),
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut passthrough: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            passthrough.extend(argv[i + 1..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -c<document>
                'c' => {
                    let doc = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-c requires a document argument".to_owned());
                    };
                    args.source = Source::Inline(doc);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    if args.source == Source::Stdin {
        if let Some(first) = positional.next() {
            if first != "-" {
                args.source = Source::File(PathBuf::from(first));
            }
        }
    }
    args.caller_args = positional.chain(passthrough).collect();

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the config file: `tmacro.conf` in the per-user config
/// directory, then in the current directory.
pub fn find_user_config() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tmacro")
        .map(|dirs| dirs.config_dir().join("tmacro.conf"))
        .into_iter()
        .chain([PathBuf::from("./tmacro.conf")])
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
