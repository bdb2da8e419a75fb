//! The evaluation loop.
//!
//! [`Interpreter`] repeatedly asks the [`FunctionScanner`] for a worklist and
//! works through it:
//!
//! - `$if` / `$endif` entries hand the document to the block resolver, which
//!   splices the selected branch in place of the innermost block.  The pass
//!   then restarts on the rewritten document.
//! - Every other entry is unpacked, its marker-bearing arguments are resolved
//!   recursively, the function is called, and its escaped result replaces
//!   the invocation.
//!
//! The loop ends when a pass completes without hitting a control keyword.
//! The final document is unescaped and trimmed once.
//!
//! Calls run strictly one after another.  A function may suspend (it is
//! `async`), and the loop waits for it before touching the next entry.

use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::sink::{DiagnosticSink, Render, RenderSink};

use super::condition;
use super::control::{find_innermost_block, is_inside_block};
use super::document::Document;
use super::error::EvalError;
use super::escape::{escape, unescape};
use super::function::{Arg, CallContext, FunctionRegistry, Invocation};
use super::outcome::{Artifacts, Outcome};
use super::scanner::{is_control, FunctionScanner};
use super::state::ExecutionState;
use super::unpack::{unpack, Unpacked};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Limits ────────────────────────────────────────────────────────────────────

/// Bounds on one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Deepest nesting of argument and condition resolution.
    pub max_depth: usize,
    /// Function calls plus block splices.
    pub max_invocations: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_depth: 64, max_invocations: 10_000 }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// A successful evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Unescaped, trimmed render.
    pub text: String,
    pub artifacts: Artifacts,
    /// The state as the last function left it.
    pub state: ExecutionState,
}

/// What [`Interpreter::run`] reports back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalResult {
    pub error: bool,
    /// Id of the delivered message, or the `$useMessage` override.
    pub id: Option<String>,
    /// `None` on error.
    pub result: Option<String>,
    pub artifacts: Artifacts,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Mutable data for one top-level evaluation.
struct Session {
    state: ExecutionState,
    artifacts: Artifacts,
    invocation: Invocation,
    invocations: usize,
}

impl Session {
    fn count(&mut self, limits: &Limits) -> Result<(), EvalError> {
        self.invocations += 1;
        if self.invocations > limits.max_invocations {
            return Err(EvalError::LimitExceeded(format!(
                "more than {} invocations",
                limits.max_invocations
            )));
        }
        Ok(())
    }
}

fn render_text(doc: &Document) -> String {
    unescape(doc.as_str()).trim().to_owned()
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter {
    registry: Arc<FunctionRegistry>,
    scanner: FunctionScanner,
    limits: Limits,
    require_endelseif: bool,
}

impl Interpreter {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        let scanner = FunctionScanner::new(registry.names());
        Interpreter { registry, scanner, limits: Limits::default(), require_endelseif: false }
    }

    /// Build an interpreter with the limits and block strictness of `config`.
    pub fn from_config(registry: Arc<FunctionRegistry>, config: &Config) -> Self {
        Self::new(registry)
            .with_limits(config.limits)
            .with_require_endelseif(config.require_endelseif)
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Make a `$elseif` without `$endelseif` a structural error.
    pub fn with_require_endelseif(mut self, require: bool) -> Self {
        self.require_endelseif = require;
        self
    }

    /// Evaluate `source` to its final render.
    pub async fn evaluate(
        &self,
        source: &str,
        invocation: Invocation,
        state: ExecutionState,
    ) -> Result<Evaluation, EvalError> {
        let mut session = Session {
            state,
            artifacts: Artifacts::default(),
            invocation,
            invocations: 0,
        };
        let doc = self.resolve(&mut session, Document::new(source), 0).await?;
        Ok(Evaluation {
            text: render_text(&doc),
            artifacts: session.artifacts,
            state: session.state,
        })
    }

    /// Evaluate `source` and deliver the outcome.
    ///
    /// A successful render is delivered when its text is non-empty or it
    /// carries elements or attachments.  A fatal error goes to `diagnostics`
    /// and nothing is rendered.
    pub async fn run(
        &self,
        source: &str,
        invocation: Invocation,
        state: ExecutionState,
        render: &dyn RenderSink,
        diagnostics: &dyn DiagnosticSink,
    ) -> EvalResult {
        let eval = match self.evaluate(source, invocation, state).await {
            Ok(eval) => eval,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "evaluation failed");
                diagnostics.report(&e.diagnostic());
                return EvalResult { error: true, ..EvalResult::default() };
            }
        };

        let mut id = eval.artifacts.message.clone();
        if !eval.text.is_empty() || eval.artifacts.has_content() {
            let out = Render {
                text: (!eval.text.is_empty()).then(|| eval.text.clone()),
                artifacts: eval.artifacts.clone(),
            };
            match render.deliver(out).await {
                Ok(delivered) => id = delivered.or(id),
                Err(e) => warn!(error = %e, "render delivery failed"),
            }
        }
        EvalResult { error: false, id, result: Some(eval.text), artifacts: eval.artifacts }
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    /// Resolve every invocation and block in `doc`.  The returned document
    /// is still escaped.
    fn resolve<'a>(
        &'a self,
        session: &'a mut Session,
        doc: Document,
        depth: usize,
    ) -> BoxFuture<'a, Result<Document, EvalError>> {
        Box::pin(async move {
            if depth > self.limits.max_depth {
                return Err(EvalError::LimitExceeded(format!(
                    "nesting deeper than {} levels",
                    self.limits.max_depth
                )));
            }
            let mut doc = doc;
            'pass: loop {
                let worklist = self.scanner.scan(doc.as_str());
                trace!(depth, entries = worklist.len(), "worklist");
                for name in worklist {
                    // Calls inside an unresolved block wait for branch selection.
                    let pending = is_control(name)
                        || doc.find_name(name, 0).is_some_and(|pos| is_inside_block(doc.as_str(), pos));
                    if pending {
                        doc = self.resolve_block(session, doc, depth).await?;
                        continue 'pass;
                    }
                    self.invoke(session, &mut doc, name, depth).await?;
                }
                return Ok(doc);
            }
        })
    }

    /// Replace the innermost `$if` block with its selected branch.
    async fn resolve_block(
        &self,
        session: &mut Session,
        doc: Document,
        depth: usize,
    ) -> Result<Document, EvalError> {
        let block = find_innermost_block(doc.as_str(), self.require_endelseif)?;
        session.count(&self.limits)?;

        let selected: &[Range<usize>] =
            if self.condition_holds(session, doc.slice(block.condition.clone()), depth).await? {
                trace!(branch = "if", "branch selected");
                block.if_body.as_slice()
            } else {
                let mut chosen = None;
                for (i, elseif) in block.elseifs.iter().enumerate() {
                    if self.condition_holds(session, doc.slice(elseif.condition.clone()), depth).await? {
                        trace!(branch = "elseif", index = i, "branch selected");
                        chosen = Some(std::slice::from_ref(&elseif.body));
                        break;
                    }
                }
                chosen.unwrap_or_else(|| {
                    trace!(branch = "else", "branch selected");
                    block.else_body.as_slice()
                })
            };

        let body = doc.gather(selected);
        let mut doc = doc;
        doc.splice(block.span.clone(), body);
        Ok(doc)
    }

    async fn condition_holds(
        &self,
        session: &mut Session,
        cond: Document,
        depth: usize,
    ) -> Result<bool, EvalError> {
        let resolved = self.resolve(session, cond, depth + 1).await?;
        let holds = condition::evaluate(resolved.as_str());
        trace!(condition = resolved.as_str(), holds, "condition");
        Ok(holds)
    }

    /// Resolve the first occurrence of `name` in `doc`.
    async fn invoke(
        &self,
        session: &mut Session,
        doc: &mut Document,
        name: &str,
        depth: usize,
    ) -> Result<(), EvalError> {
        let Some(desc) = self.registry.get(name) else {
            return Ok(());
        };
        let (span, raw_args, bracketed) = match unpack(doc, name) {
            Unpacked::Bare { span } => (span, Vec::new(), false),
            Unpacked::Call { span, args } => (span, args, true),
            other => {
                trace!(function = name, found = ?other, "left as text");
                return Ok(());
            }
        };
        if desc.brackets_required() && !bracketed {
            return Err(EvalError::Usage {
                function: desc.name().to_owned(),
                params: desc.params().to_vec(),
            });
        }
        session.count(&self.limits)?;

        let mut args = Vec::with_capacity(raw_args.len());
        for raw in raw_args {
            let arg = match raw {
                None => Arg::Absent,
                Some(range) => {
                    let raw = doc.slice(range);
                    if raw.has_markers() {
                        let resolved = self.resolve(session, raw, depth + 1).await?;
                        Arg::Text(render_text(&resolved))
                    } else {
                        Arg::Text(unescape(raw.as_str()))
                    }
                }
            };
            args.push(arg);
        }

        debug!(function = desc.name(), args = args.len(), depth, "invoke");
        let ctx = CallContext {
            function: desc.name(),
            invocation: &session.invocation,
            artifacts: &session.artifacts,
        };
        let (value, patch) = match desc.call(&ctx, args, &mut session.state).await {
            Outcome::Value(value) => (value, None),
            Outcome::WithArtifacts { value, artifacts } => (value, Some(artifacts)),
            Outcome::Error(message) => {
                return Err(EvalError::Function { function: desc.name().to_owned(), message });
            }
        };

        doc.splice(span, Document::literal(escape(value.as_deref().unwrap_or(""))));
        if let Some(patch) = patch {
            session.artifacts.apply(patch);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::control::StructuralError;
    use crate::script::function::FunctionDescriptor;
    use crate::script::outcome::{ArtifactPatch, Element, ElementKind};
    use crate::sink::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn text_arg(args: &[Arg], i: usize) -> String {
        args.get(i).and_then(Arg::as_text).unwrap_or("").to_owned()
    }

    fn registry() -> FunctionRegistry {
        let mut reg = FunctionRegistry::new();
        reg.register(FunctionDescriptor::sync("$upper", true, &["text"], |_, args, _| {
            Outcome::text(text_arg(args, 0).to_uppercase())
        }));
        reg.register(FunctionDescriptor::sync("$echo", true, &["text"], |_, args, _| {
            Outcome::text(text_arg(args, 0))
        }));
        reg.register(FunctionDescriptor::sync("$count", true, &["args"], |_, args, _| {
            Outcome::text(args.len().to_string())
        }));
        reg.register(FunctionDescriptor::sync("$absent", true, &["a", "b"], |_, args, _| {
            Outcome::text(args.iter().map(|a| if a.is_absent() { "-" } else { "+" }).collect::<String>())
        }));
        reg.register(FunctionDescriptor::sync("$set", true, &["name", "value"], |_, args, state| {
            state.set_var(text_arg(args, 0), text_arg(args, 1));
            Outcome::empty()
        }));
        reg.register(FunctionDescriptor::sync("$get", true, &["name"], |_, args, state| {
            Outcome::text(state.var(&text_arg(args, 0)).unwrap_or(""))
        }));
        reg.register(FunctionDescriptor::sync("$fail", true, &["message"], |_, args, _| {
            Outcome::error(text_arg(args, 0))
        }));
        reg.register(FunctionDescriptor::sync("$now", false, &[], |_, _, _| Outcome::text("NOW")));
        reg.register(FunctionDescriptor::sync("$embed", true, &["content"], |ctx, args, _| {
            let mut elements = ctx.artifacts.elements.clone();
            elements.push(Element { kind: ElementKind::Embed, content: text_arg(args, 0) });
            Outcome::artifacts(ArtifactPatch { elements: Some(elements), ..Default::default() })
        }));
        reg.register(FunctionDescriptor::sync("$reset", false, &[], |_, _, _| {
            Outcome::artifacts(ArtifactPatch { elements: Some(Vec::new()), ..Default::default() })
        }));
        reg.register(FunctionDescriptor::sync("$cmd", false, &[], |ctx, _, _| {
            Outcome::text(format!("{} {}", ctx.invocation.command, ctx.invocation.args.join(",")))
        }));
        reg
    }

    fn interp() -> Interpreter {
        Interpreter::new(Arc::new(registry()))
    }

    async fn eval(src: &str) -> Result<String, EvalError> {
        interp()
            .evaluate(src, Invocation::default(), ExecutionState::new())
            .await
            .map(|e| e.text)
    }

    #[tokio::test]
    async fn plain_text_is_trimmed() {
        assert_eq!(eval("  hello world \n").await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn simple_call() {
        assert_eq!(eval("say $upper[hi]!").await.unwrap(), "say HI!");
    }

    #[tokio::test]
    async fn nested_arguments_resolve_first() {
        assert_eq!(eval("$upper[a$echo[b]c]").await.unwrap(), "ABC");
        assert_eq!(eval("$count[$echo[x];y]").await.unwrap(), "2");
    }

    #[tokio::test]
    async fn results_are_never_reinterpreted() {
        assert_eq!(eval("$echo[#CHAR#upper#LEFT#x#RIGHT#]").await.unwrap(), "$upper[x]");
    }

    #[tokio::test]
    async fn absent_slots_reach_the_function() {
        assert_eq!(eval("$absent[a;;b]").await.unwrap(), "+-+");
    }

    #[tokio::test]
    async fn bare_reference() {
        assert_eq!(eval("time: $now").await.unwrap(), "time: NOW");
    }

    #[tokio::test]
    async fn missing_brackets_is_usage_error() {
        let err = eval("$upper").await.unwrap_err();
        assert_eq!(err, EvalError::Usage { function: "$upper".into(), params: vec!["text".into()] });
    }

    #[tokio::test]
    async fn function_error_aborts() {
        let err = eval("$set[x;1]$fail[nope]").await.unwrap_err();
        assert_eq!(err, EvalError::Function { function: "$fail".into(), message: "nope".into() });
    }

    #[tokio::test]
    async fn state_is_shared_across_calls() {
        assert_eq!(eval("$set[x;42]\nvalue=$get[x]").await.unwrap(), "value=42");
    }

    #[tokio::test]
    async fn escaped_invocation_left_alone() {
        assert_eq!(eval("$$upper[x]").await.unwrap(), "$$upper[x]");
    }

    #[tokio::test]
    async fn unterminated_invocation_left_alone() {
        assert_eq!(eval("$upper[x").await.unwrap(), "$upper[x");
    }

    #[tokio::test]
    async fn if_else_branches() {
        assert_eq!(eval("$if[1==1]A$else B$endif").await.unwrap(), "A");
        assert_eq!(eval("$if[1==2]A$elseif[2==2]B$else C$endif").await.unwrap(), "B");
        assert_eq!(eval("$if[1==2]A$else B$endif").await.unwrap(), "B");
        assert_eq!(eval("$if[1==2]A$endif").await.unwrap(), "");
    }

    #[tokio::test]
    async fn nested_if_in_condition() {
        assert_eq!(eval("$if[$if[1==1]1$endif==1]YES$endif").await.unwrap(), "YES");
    }

    #[tokio::test]
    async fn condition_resolves_functions() {
        assert_eq!(eval("$set[v;3]\n$if[$get[v]>=3]big$else small$endif").await.unwrap(), "big");
    }

    #[tokio::test]
    async fn discarded_branch_never_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut reg = registry();
        reg.register(FunctionDescriptor::sync("$tick", false, &[], move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Outcome::empty()
        }));
        let interp = Interpreter::new(Arc::new(reg));
        let out = interp
            .evaluate("$if[1==1]A$else $tick B$endif", Invocation::default(), ExecutionState::new())
            .await
            .unwrap();
        assert_eq!(out.text, "A");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn discarded_branch_on_opening_line_never_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut reg = registry();
        reg.register(FunctionDescriptor::sync("$tick", false, &[], move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Outcome::text("T")
        }));
        let interp = Interpreter::new(Arc::new(reg));
        let out = interp
            .evaluate("$if[1==2] $tick\n$else E\n$endif\n$tick", Invocation::default(), ExecutionState::new())
            .await
            .unwrap();
        assert_eq!(out.text, "E\n\nT");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn functions_in_selected_body_run() {
        assert_eq!(eval("$if[a==a]$upper[yes]$endif").await.unwrap(), "YES");
    }

    #[tokio::test]
    async fn sibling_blocks() {
        assert_eq!(eval("$if[1==1]A$endif-$if[1==2]B$else C$endif").await.unwrap(), "A- C");
    }

    #[tokio::test]
    async fn missing_endif_is_structural() {
        let err = eval("$if[1==1]A").await.unwrap_err();
        assert_eq!(err, EvalError::Structural(StructuralError::MissingEndIf));
    }

    #[tokio::test]
    async fn strict_endelseif() {
        let interp = interp().with_require_endelseif(true);
        let err = interp
            .evaluate("$if[1==2]A$elseif[2==2]B$else C$endif", Invocation::default(), ExecutionState::new())
            .await
            .unwrap_err();
        assert_eq!(err, EvalError::Structural(StructuralError::MissingEndElseIf));
    }

    #[tokio::test]
    async fn artifacts_overwrite() {
        let out = interp()
            .evaluate("$embed[a]$embed[b]", Invocation::default(), ExecutionState::new())
            .await
            .unwrap();
        assert_eq!(out.artifacts.elements.len(), 2);

        let out = interp()
            .evaluate("$embed[a]\n$reset", Invocation::default(), ExecutionState::new())
            .await
            .unwrap();
        assert!(out.artifacts.elements.is_empty());
    }

    #[tokio::test]
    async fn invocation_context_is_visible() {
        let inv = Invocation::new("greet", vec!["a".into(), "b".into()]);
        let out = interp().evaluate("$cmd", inv, ExecutionState::new()).await.unwrap();
        assert_eq!(out.text, "greet a,b");
    }

    #[tokio::test]
    async fn invocation_limit() {
        let interp = interp().with_limits(Limits { max_depth: 64, max_invocations: 2 });
        let err = interp
            .evaluate("$echo[a]$echo[b]$echo[c]", Invocation::default(), ExecutionState::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn depth_limit() {
        let interp = interp().with_limits(Limits { max_depth: 1, max_invocations: 100 });
        let err = interp
            .evaluate("$echo[$echo[$echo[x]]]", Invocation::default(), ExecutionState::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn run_delivers_render() {
        let sink = MemorySink::new();
        let res = interp()
            .run("$upper[ok]", Invocation::default(), ExecutionState::new(), &sink, &sink)
            .await;
        assert!(!res.error);
        assert_eq!(res.result.as_deref(), Some("OK"));
        assert_eq!(res.id.as_deref(), Some("msg-1"));
        assert_eq!(sink.renders()[0].text.as_deref(), Some("OK"));
        assert!(sink.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn run_skips_empty_render() {
        let sink = MemorySink::new();
        let res = interp()
            .run("$set[x;1]", Invocation::default(), ExecutionState::new(), &sink, &sink)
            .await;
        assert!(!res.error);
        assert_eq!(res.result.as_deref(), Some(""));
        assert!(sink.renders().is_empty());
    }

    #[tokio::test]
    async fn run_delivers_artifacts_without_text() {
        let sink = MemorySink::new();
        interp()
            .run("$embed[card]", Invocation::default(), ExecutionState::new(), &sink, &sink)
            .await;
        let renders = sink.renders();
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].text, None);
        assert_eq!(renders[0].artifacts.elements[0].content, "card");
    }

    #[tokio::test]
    async fn run_reports_errors() {
        let sink = MemorySink::new();
        let res = interp()
            .run("$upper", Invocation::default(), ExecutionState::new(), &sink, &sink)
            .await;
        assert!(res.error);
        assert_eq!(res.result, None);
        assert!(sink.renders().is_empty());
        let diags = sink.diagnostics();
        assert_eq!(diags[0].hint.as_deref(), Some("Usage: $upper[text]"));
    }
}
