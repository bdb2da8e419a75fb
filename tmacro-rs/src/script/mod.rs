//! The macro language.
//!
//! A document is plain text with `$name[arg;arg]` invocations and
//! `$if[cond] ... $elseif[cond] ... $else ... $endif` blocks.  Evaluation
//! replaces every invocation with its result and every block with its
//! selected branch.
//!
//! | Module | Role |
//! |--------|------|
//! | [`escape`] | hides structural characters inside produced values |
//! | [`condition`] | evaluates resolved condition text |
//! | [`scanner`] | builds the worklist of function names |
//! | [`unpack`] | locates an invocation and splits its arguments |
//! | [`control`] | extracts the innermost `$if` block |
//! | [`interp`] | the evaluation loop |
//! | [`builtins`] | the standard function library |
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use tmacro::script::{ExecutionState, FunctionRegistry, Interpreter, Invocation};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let interp = Interpreter::new(Arc::new(FunctionRegistry::with_builtins()));
//! let eval = interp
//!     .evaluate("$if[$sum[2;3]==5]five$else other$endif", Invocation::default(), ExecutionState::new())
//!     .await
//!     .unwrap();
//! assert_eq!(eval.text, "five");
//! # });
//! ```

pub mod builtins;
pub mod condition;
pub mod control;
pub mod document;
pub mod error;
pub mod escape;
pub mod function;
pub mod interp;
pub mod outcome;
pub mod scanner;
pub mod state;
pub mod unpack;

// Re-exports for convenience.
pub use control::StructuralError;
pub use error::{Diagnostic, EvalError};
pub use function::{Arg, CallContext, FunctionDescriptor, FunctionRegistry, Invocation, MacroFunction};
pub use interp::{EvalResult, Evaluation, Interpreter, Limits};
pub use outcome::{ArtifactPatch, Artifacts, Attachment, Element, ElementKind, Outcome};
pub use state::ExecutionState;
