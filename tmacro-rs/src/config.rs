//! `tmacro.conf` configuration file parser.
//!
//! One setting per line:
//!
//! | Key | Value | Default |
//! |-----|-------|---------|
//! | `max_depth` | nesting limit for argument and condition resolution | 64 |
//! | `max_invocations` | function calls plus block splices per evaluation | 10000 |
//! | `timezone` | initial `$timezone` | `UTC` |
//! | `require_endelseif` | make a missing `$endelseif` an error | `off` |
//! | `color` | red diagnostics on a terminal | `on` |
//!
//! Lines look like `key = value`.  Values may be double-quoted.  Lines
//! starting with `;` are comments.  A bad line is reported and skipped; the
//! rest of the file still loads.

use std::path::Path;

use thiserror::Error;

use crate::script::Limits;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub limits: Limits,
    pub timezone: String,
    pub require_endelseif: bool,
    pub color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            limits: Limits::default(),
            timezone: "UTC".to_owned(),
            require_endelseif: false,
            color: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.  Returns the config and a list of any errors.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError { line: lineno, message: format!("expected `key = value`, got `{line}`") });
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            if let Err(message) = config.set(&key, &unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply one setting.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "max_depth" => self.limits.max_depth = parse_count(key, value)?,
            "max_invocations" => self.limits.max_invocations = parse_count(key, value)?,
            "timezone" => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return Err(format!("timezone: invalid value `{value}`"));
                }
                self.timezone = value.to_owned();
            }
            "require_endelseif" => self.require_endelseif = parse_flag(key, value)?,
            "color" => self.color = parse_flag(key, value)?,
            _ => return Err(format!("unknown key `{key}`")),
        }
        Ok(())
    }
}

// ── Value parsing ─────────────────────────────────────────────────────────────

/// Strip surrounding double quotes, honouring `\"` escapes inside them.
fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return s.to_owned();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn parse_count(key: &str, value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err(format!("{key}: must be at least 1")),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("{key}: expected a number, got `{value}`")),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        _ => Err(format!("{key}: expected on or off, got `{value}`")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
