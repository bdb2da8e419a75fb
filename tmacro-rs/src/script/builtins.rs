//! The standard function library.
//!
//! Each synchronous builtin is a plain `fn` returning `Result<Outcome,
//! String>`; an `Err` becomes [`Outcome::Error`], which stops the
//! evaluation.  [`register_builtins`] loads them all into a registry.
//!
//! Indexes are 1-based.  Artifact builtins read the accumulated artifacts
//! from the call context and return the complete new value, because an
//! outcome's artifacts replace the accumulated ones.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::condition;
use super::escape::escape;
use super::function::{Arg, CallContext, FunctionDescriptor, FunctionRegistry, MacroFunction};
use super::outcome::{ArtifactPatch, Attachment, Element, ElementKind, Outcome};
use super::state::ExecutionState;

type Builtin = fn(&CallContext<'_>, &[Arg], &mut ExecutionState) -> Result<Outcome, String>;

/// Longest string `$repeat` will build.
const MAX_REPEAT_BYTES: usize = 1 << 20;

/// Longest `$sleep`, in milliseconds.
const MAX_SLEEP_MS: u64 = 60_000;

fn builtin(name: &str, brackets: bool, params: &[&str], f: Builtin) -> FunctionDescriptor {
    FunctionDescriptor::sync(name, brackets, params, move |ctx, args, state| {
        f(ctx, args, state).unwrap_or_else(Outcome::Error)
    })
}

/// Add every builtin to `reg`.
pub fn register_builtins(reg: &mut FunctionRegistry) {
    // ── Conditions and variables ──────────────────────────────────────────────
    reg.register(builtin("$checkCondition", true, &["condition"], check_condition));
    reg.register(builtin("$let", true, &["name", "value"], let_var));
    reg.register(builtin("$get", true, &["name"], get_var));
    reg.register(builtin("$unset", true, &["name"], unset));

    // ── Arrays and splits ─────────────────────────────────────────────────────
    reg.register(builtin("$createArray", true, &["name", "item"], create_array));
    reg.register(builtin("$arrayAt", true, &["name", "index"], array_at));
    reg.register(builtin("$arrayLength", true, &["name"], array_length));
    reg.register(builtin("$arrayJoin", true, &["name", "separator"], array_join));
    reg.register(builtin("$textSplit", true, &["text", "separator"], text_split));
    reg.register(builtin("$splitText", true, &["index"], split_text));
    reg.register(builtin("$splitCount", false, &[], split_count));

    // ── Random and time ───────────────────────────────────────────────────────
    reg.register(builtin("$random", true, &["min", "max", "name"], random));
    reg.register(builtin("$timezone", false, &["timezone"], timezone));

    // ── Text ──────────────────────────────────────────────────────────────────
    reg.register(builtin("$upper", true, &["text"], upper));
    reg.register(builtin("$lower", true, &["text"], lower));
    reg.register(builtin("$trim", true, &["text"], trim));
    reg.register(builtin("$length", true, &["text"], length));
    reg.register(builtin("$replace", true, &["text", "from", "to"], replace));
    reg.register(builtin("$repeat", true, &["text", "count"], repeat));
    reg.register(builtin("$sum", true, &["number"], sum));
    reg.register(builtin("$args", false, &["index"], caller_args));

    // ── Artifacts ─────────────────────────────────────────────────────────────
    reg.register(builtin("$addElement", true, &["kind", "content"], add_element));
    reg.register(builtin("$attachment", true, &["name", "content"], attachment));
    reg.register(builtin("$flags", true, &["value"], flags));
    reg.register(builtin("$useMessage", true, &["id"], use_message));

    // ── Misc ──────────────────────────────────────────────────────────────────
    reg.register(builtin("$error", true, &["message"], error));
    reg.register(builtin("$version", false, &[], version));
    reg.register(FunctionDescriptor::new("$sleep", true, &["milliseconds"], Sleep));
}

impl FunctionRegistry {
    /// A registry preloaded with the standard library.
    pub fn with_builtins() -> Self {
        let mut reg = FunctionRegistry::new();
        register_builtins(&mut reg);
        reg
    }
}

// ── Conditions and variables ──────────────────────────────────────────────────

fn check_condition(_: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    // The argument is already unescaped; re-escape so operands decode once.
    let cond = escape(opt_text(args, 0).unwrap_or(""));
    Ok(Outcome::text(condition::evaluate(&cond).to_string()))
}

fn let_var(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    state.set_var(name, opt_text(args, 1).unwrap_or(""));
    Ok(Outcome::empty())
}

fn get_var(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    Ok(Outcome::text(state.var(name).unwrap_or("")))
}

fn unset(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    if !state.unset_var(name) {
        tracing::debug!(variable = name, "unset of undefined variable");
    }
    Ok(Outcome::empty())
}

// ── Arrays and splits ─────────────────────────────────────────────────────────

fn create_array(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    let items = args[1..].iter().map(|a| a.as_text().unwrap_or("").to_owned()).collect();
    state.set_array(name, items);
    Ok(Outcome::empty())
}

fn array_at(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    let index = get_index(args, 1, ctx.function)?;
    let item = state.array(name).and_then(|items| items.get(index)).map_or("", String::as_str);
    Ok(Outcome::text(item))
}

fn array_length(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    Ok(Outcome::text(state.array(name).map_or(0, <[String]>::len).to_string()))
}

fn array_join(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?;
    let sep = opt_text(args, 1).unwrap_or(", ");
    Ok(Outcome::text(state.array(name).map(|items| items.join(sep)).unwrap_or_default()))
}

fn text_split(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let text = opt_text(args, 0).unwrap_or("");
    let sep = get_text(args, 1, ctx.function)?;
    state.splits = if sep.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(sep).map(str::to_owned).collect()
    };
    Ok(Outcome::empty())
}

fn split_text(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let index = get_index(args, 0, ctx.function)?;
    Ok(Outcome::text(state.splits.get(index).map_or("", String::as_str)))
}

fn split_count(_: &CallContext<'_>, _: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::text(state.splits.len().to_string()))
}

// ── Random and time ───────────────────────────────────────────────────────────

fn random(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    let min = get_int(args, 0, ctx.function)?;
    let max = get_int(args, 1, ctx.function)?;
    if min > max {
        return Err(format!("{}: min {min} is greater than max {max}", ctx.function));
    }
    let draw = || rand::thread_rng().gen_range(min..=max);
    let n = match opt_text(args, 2) {
        Some(name) => state.random_or_insert_with(name, draw),
        None => draw(),
    };
    Ok(Outcome::text(n.to_string()))
}

fn timezone(ctx: &CallContext<'_>, args: &[Arg], state: &mut ExecutionState) -> Result<Outcome, String> {
    match opt_text(args, 0).map(str::trim) {
        Some(tz) if tz.is_empty() || tz.contains(char::is_whitespace) => {
            Err(format!("{}: invalid timezone '{tz}'", ctx.function))
        }
        Some(tz) => {
            state.timezone = tz.to_owned();
            Ok(Outcome::empty())
        }
        None => Ok(Outcome::text(state.timezone.clone())),
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

fn upper(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::text(get_text(args, 0, ctx.function)?.to_uppercase()))
}

fn lower(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::text(get_text(args, 0, ctx.function)?.to_lowercase()))
}

fn trim(_: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::text(opt_text(args, 0).unwrap_or("").trim()))
}

fn length(_: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::text(opt_text(args, 0).unwrap_or("").chars().count().to_string()))
}

fn replace(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let text = opt_text(args, 0).unwrap_or("");
    let from = get_text(args, 1, ctx.function)?;
    let to = opt_text(args, 2).unwrap_or("");
    if from.is_empty() {
        return Ok(Outcome::text(text));
    }
    Ok(Outcome::text(text.replace(from, to)))
}

fn repeat(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let text = opt_text(args, 0).unwrap_or("");
    let count = get_int(args, 1, ctx.function)?;
    let count = usize::try_from(count).map_err(|_| format!("{}: negative count {count}", ctx.function))?;
    if text.len().saturating_mul(count) > MAX_REPEAT_BYTES {
        return Err(format!("{}: result longer than {MAX_REPEAT_BYTES} bytes", ctx.function));
    }
    Ok(Outcome::text(text.repeat(count)))
}

fn sum(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let mut total = 0.0;
    for (i, arg) in args.iter().enumerate() {
        if !arg.is_absent() {
            total += get_number(args, i, ctx.function)?;
        }
    }
    Ok(Outcome::text(format_number(total)))
}

/// Integral values print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn caller_args(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let caller = &ctx.invocation.args;
    if opt_text(args, 0).is_none() {
        return Ok(Outcome::text(caller.join(" ")));
    }
    let index = get_index(args, 0, ctx.function)?;
    Ok(Outcome::text(caller.get(index).map_or("", String::as_str)))
}

// ── Artifacts ─────────────────────────────────────────────────────────────────

fn add_element(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let kind: ElementKind = get_text(args, 0, ctx.function)?
        .parse()
        .map_err(|e| format!("{}: {e}", ctx.function))?;
    let content = opt_text(args, 1).unwrap_or("").to_owned();
    let mut elements = ctx.artifacts.elements.clone();
    elements.push(Element { kind, content });
    Ok(Outcome::artifacts(ArtifactPatch { elements: Some(elements), ..ArtifactPatch::default() }))
}

fn attachment(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let name = get_text(args, 0, ctx.function)?.to_owned();
    let data = opt_text(args, 1).unwrap_or("").as_bytes().to_vec();
    let mut attachments = ctx.artifacts.attachments.clone();
    attachments.push(Attachment { name, data });
    Ok(Outcome::artifacts(ArtifactPatch { attachments: Some(attachments), ..ArtifactPatch::default() }))
}

fn flags(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let value = get_text(args, 0, ctx.function)?.to_owned();
    Ok(Outcome::artifacts(ArtifactPatch { flags: Some(value), ..ArtifactPatch::default() }))
}

fn use_message(ctx: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    let id = get_text(args, 0, ctx.function)?.to_owned();
    Ok(Outcome::artifacts(ArtifactPatch { message: Some(id), ..ArtifactPatch::default() }))
}

// ── Misc ──────────────────────────────────────────────────────────────────────

fn error(_: &CallContext<'_>, args: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::error(opt_text(args, 0).unwrap_or("error")))
}

fn version(_: &CallContext<'_>, _: &[Arg], _: &mut ExecutionState) -> Result<Outcome, String> {
    Ok(Outcome::text(env!("CARGO_PKG_VERSION")))
}

/// `$sleep[ms]`: suspends the evaluation.
struct Sleep;

#[async_trait]
impl MacroFunction for Sleep {
    async fn call(&self, ctx: &CallContext<'_>, args: Vec<Arg>, _: &mut ExecutionState) -> Outcome {
        let ms = match get_int(&args, 0, ctx.function) {
            Ok(ms) => ms,
            Err(e) => return Outcome::Error(e),
        };
        let Ok(ms) = u64::try_from(ms) else {
            return Outcome::error(format!("{}: negative duration {ms}", ctx.function));
        };
        tokio::time::sleep(Duration::from_millis(ms.min(MAX_SLEEP_MS))).await;
        Outcome::empty()
    }
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn opt_text(args: &[Arg], idx: usize) -> Option<&str> {
    args.get(idx).and_then(Arg::as_text)
}

fn get_text<'a>(args: &'a [Arg], idx: usize, name: &str) -> Result<&'a str, String> {
    opt_text(args, idx).ok_or_else(|| format!("{name}: argument {} missing", idx + 1))
}

fn get_int(args: &[Arg], idx: usize, name: &str) -> Result<i64, String> {
    let s = get_text(args, idx, name)?.trim();
    s.parse().map_err(|_| format!("{name}: '{s}' is not an integer"))
}

fn get_number(args: &[Arg], idx: usize, name: &str) -> Result<f64, String> {
    let s = get_text(args, idx, name)?.trim();
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("{name}: '{s}' is not a number"))
}

/// A 1-based index argument, returned 0-based.
fn get_index(args: &[Arg], idx: usize, name: &str) -> Result<usize, String> {
    let n = get_int(args, idx, name)?;
    usize::try_from(n)
        .ok()
        .and_then(|n| n.checked_sub(1))
        .ok_or_else(|| format!("{name}: index {n} out of range"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
