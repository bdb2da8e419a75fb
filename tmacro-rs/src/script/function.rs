//! Function descriptors and the registry the interpreter resolves names
//! against.
//!
//! A function is anything implementing [`MacroFunction`].  Most functions are
//! synchronous and are registered from a closure with
//! [`FunctionDescriptor::sync`]; functions that need to suspend (I/O, timers)
//! implement the trait directly.
//!
//! Names are stored `$`-prefixed and looked up ASCII-case-insensitively, so
//! `$userTag`, `$USERTAG` and `usertag` all find the same descriptor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::outcome::{Artifacts, Outcome};
use super::state::ExecutionState;

// ── Arguments ─────────────────────────────────────────────────────────────────

/// One resolved argument.  An empty slot (`$f[a;;b]`) is [`Arg::Absent`],
/// which is distinct from an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Absent,
    Text(String),
}

impl Arg {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            Arg::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Arg::Absent)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_owned())
    }
}

// ── Call context ──────────────────────────────────────────────────────────────

/// Who triggered the evaluation: the command name and its caller arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Invocation { command: command.into(), args }
    }
}

/// Read-only view of the evaluation handed to every call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Registered name of the function being called.
    pub function: &'a str,
    pub invocation: &'a Invocation,
    /// Artifacts accumulated so far.
    pub artifacts: &'a Artifacts,
}

// ── MacroFunction ─────────────────────────────────────────────────────────────

/// The invocation capability of a registered function.
#[async_trait]
pub trait MacroFunction: Send + Sync {
    async fn call(
        &self,
        ctx: &CallContext<'_>,
        args: Vec<Arg>,
        state: &mut ExecutionState,
    ) -> Outcome;
}

/// Adapter that runs a plain closure as a [`MacroFunction`].
struct SyncFn<F>(F);

#[async_trait]
impl<F> MacroFunction for SyncFn<F>
where
    F: Fn(&CallContext<'_>, &[Arg], &mut ExecutionState) -> Outcome + Send + Sync,
{
    async fn call(
        &self,
        ctx: &CallContext<'_>,
        args: Vec<Arg>,
        state: &mut ExecutionState,
    ) -> Outcome {
        (self.0)(ctx, &args, state)
    }
}

// ── FunctionDescriptor ────────────────────────────────────────────────────────

/// A registered function.
#[derive(Clone)]
pub struct FunctionDescriptor {
    name: String,
    brackets: bool,
    params: Vec<String>,
    handler: Arc<dyn MacroFunction>,
}

impl FunctionDescriptor {
    /// Describe a function.  `name` gains a leading `$` if it lacks one.
    /// `params` are only used in usage diagnostics.
    pub fn new(
        name: &str,
        brackets: bool,
        params: &[&str],
        handler: impl MacroFunction + 'static,
    ) -> Self {
        let name = if name.starts_with('$') { name.to_owned() } else { format!("${name}") };
        FunctionDescriptor {
            name,
            brackets,
            params: params.iter().map(|p| (*p).to_owned()).collect(),
            handler: Arc::new(handler),
        }
    }

    /// Describe a synchronous function backed by a closure.
    pub fn sync<F>(name: &str, brackets: bool, params: &[&str], f: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Arg], &mut ExecutionState) -> Outcome + Send + Sync + 'static,
    {
        Self::new(name, brackets, params, SyncFn(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `$name` without `[...]` is a usage error.
    pub fn brackets_required(&self) -> bool {
        self.brackets
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// `$name[p1;p2]`, as shown in usage hints.
    pub fn usage(&self) -> String {
        format!("{}[{}]", self.name, self.params.join(";"))
    }

    pub async fn call(
        &self,
        ctx: &CallContext<'_>,
        args: Vec<Arg>,
        state: &mut ExecutionState,
    ) -> Outcome {
        self.handler.call(ctx, args, state).await
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("brackets", &self.brackets)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ── FunctionRegistry ──────────────────────────────────────────────────────────

/// Read-only (once built) lookup of functions by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    /// Keyed by lower-cased `$name`.
    functions: HashMap<String, FunctionDescriptor>,
}

fn key(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with('$') { lower } else { format!("${lower}") }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function, returning the one it replaced (if any).
    pub fn register(&mut self, desc: FunctionDescriptor) -> Option<FunctionDescriptor> {
        self.functions.insert(key(desc.name()), desc)
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(&key(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&key(name))
    }

    /// Registered names as declared (with `$`), in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.values().map(FunctionDescriptor::name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
