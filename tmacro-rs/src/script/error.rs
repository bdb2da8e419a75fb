//! Fatal evaluation errors and the diagnostics they are reported as.

use std::fmt;

use thiserror::Error;

use super::control::StructuralError;

/// An error that stops an evaluation.  Malformed conditions are not fatal
/// and never produce one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// A function that requires brackets was used bare.
    #[error("Invalid {function} usage: Missing brackets")]
    Usage { function: String, params: Vec<String> },

    /// A function's outcome signalled an error.
    #[error("{function}: {message}")]
    Function { function: String, message: String },

    #[error("{0}")]
    LimitExceeded(String),
}

impl EvalError {
    /// Short name of the error kind, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::Structural(_) => "structural",
            EvalError::Usage { .. } => "usage",
            EvalError::Function { .. } => "function",
            EvalError::LimitExceeded(_) => "limit",
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        let hint = match self {
            EvalError::Usage { function, params } => {
                Some(format!("Usage: {function}[{}]", params.join(";")))
            }
            _ => None,
        };
        Diagnostic { message: self.to_string(), hint }
    }
}

/// A report for the diagnostic sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    /// How to fix the problem, when known.
    pub hint: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
