/// End-to-end document tests: whole documents evaluated through the
/// standard library, checked on the final render, the delivered output and
/// the reported diagnostics.
use std::sync::Arc;

use tmacro::config::Config;
use tmacro::script::scanner::FunctionScanner;
use tmacro::script::{
    ElementKind, EvalError, EvalResult, ExecutionState, FunctionDescriptor, FunctionRegistry, Interpreter,
    Invocation, Limits, Outcome,
};
use tmacro::sink::MemorySink;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn interp() -> Interpreter {
    Interpreter::new(Arc::new(FunctionRegistry::with_builtins()))
}

async fn eval(src: &str) -> Result<String, EvalError> {
    interp()
        .evaluate(src, Invocation::default(), ExecutionState::new())
        .await
        .map(|e| e.text)
}

async fn run(interp: &Interpreter, src: &str) -> (EvalResult, MemorySink) {
    let sink = MemorySink::new();
    let result = interp
        .run(src, Invocation::new("test", Vec::new()), ExecutionState::new(), &sink, &sink)
        .await;
    (result, sink)
}

// ── Control flow ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn if_else_branches() {
    assert_eq!(eval("$if[1==1]A$else B$endif").await.unwrap(), "A");
    assert_eq!(eval("$if[1==2]A$elseif[2==2]B$else C$endif").await.unwrap(), "B");
    assert_eq!(eval("$if[1==2]A$else B$endif").await.unwrap(), "B");
    assert_eq!(eval("$if[1==2]A$endif").await.unwrap(), "");
}

#[tokio::test]
async fn nested_condition_resolves_inner_block_first() {
    assert_eq!(eval("$if[$if[1==1]1$endif==1]YES$endif").await.unwrap(), "YES");
}

#[tokio::test]
async fn nested_blocks_in_bodies() {
    let src = "$if[a==a]outer $if[b==c]no$else inner$endif$else never$endif";
    assert_eq!(eval(src).await.unwrap(), "outer  inner");
}

#[tokio::test]
async fn compound_conditions() {
    assert_eq!(eval("$if[(1==1&&2==2)||3==4]ok$endif").await.unwrap(), "ok");
    assert_eq!(eval("$if[1==)]bad$else fallback$endif").await.unwrap(), "fallback");
}

#[tokio::test]
async fn long_condition_chains() {
    let chain = vec!["a==a"; 20_000].join("&&");
    assert_eq!(eval(&format!("$if[{chain}]yes$else no$endif")).await.unwrap(), "yes");

    let deep = format!("{}1==1", "(".repeat(50_000));
    let (result, sink) = run(&interp(), &format!("$if[{deep}]yes$else no$endif")).await;
    assert!(!result.error);
    assert_eq!(result.result.as_deref(), Some("no"));
    assert!(sink.diagnostics().is_empty());
}

#[tokio::test]
async fn missing_endif_produces_no_render() {
    let (result, sink) = run(&interp(), "$if[1==1]A").await;
    assert!(result.error);
    assert_eq!(result.result, None);
    assert!(sink.renders().is_empty());
    assert_eq!(sink.diagnostics()[0].message, "Invalid $if usage: Missing $endif");
}

#[tokio::test]
async fn strict_endelseif_from_config() {
    let (config, _) = Config::load_str("require_endelseif = on");
    let strict = Interpreter::from_config(Arc::new(FunctionRegistry::with_builtins()), &config);
    let src = "$if[1==2]A$elseif[1==1]B$endif";
    let (result, sink) = run(&strict, src).await;
    assert!(result.error);
    assert_eq!(sink.diagnostics()[0].message, "Invalid $elseif usage: Missing $endelseif");

    assert_eq!(eval(src).await.unwrap(), "B");
    let (result, _) = run(&strict, "$if[1==2]A$elseif[1==1]B$endelseif$endif").await;
    assert_eq!(result.result.as_deref(), Some("B"));
}

#[tokio::test]
async fn discarded_branches_never_run() {
    let eval = interp()
        .evaluate(
            "$if[1==2]$let[hit;yes]$addElement[embed;x]$endif\n$get[hit]",
            Invocation::default(),
            ExecutionState::new(),
        )
        .await
        .unwrap();
    assert_eq!(eval.text, "");
    assert_eq!(eval.state.var("hit"), None);
    assert!(eval.artifacts.elements.is_empty());
}

#[tokio::test]
async fn elseif_conditions_are_lazy() {
    let eval = interp()
        .evaluate(
            "$if[1==1]A$elseif[$let[z;1]1==1]B$endif",
            Invocation::default(),
            ExecutionState::new(),
        )
        .await
        .unwrap();
    assert_eq!(eval.text, "A");
    assert_eq!(eval.state.var("z"), None);
}

// ── State and ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn unset_variable_reads_empty() {
    assert_eq!(eval("$let[x;1]\n$unset[x]\n[$get[x]]").await.unwrap(), "[]");
}

#[tokio::test]
async fn earlier_lines_run_first() {
    let src = "$let[x;5]\n$if[$get[x]>=5]big$else small$endif";
    assert_eq!(eval(src).await.unwrap(), "big");
}

#[tokio::test]
async fn arrays_and_splits() {
    let src = "$createArray[a;x;y;z]\n$arrayLength[a]:$arrayJoin[a;-]";
    assert_eq!(eval(src).await.unwrap(), "3:x-y-z");
    let src = "$textSplit[a,b,c;,]\n$splitText[2]/$splitCount";
    assert_eq!(eval(src).await.unwrap(), "b/3");
}

#[tokio::test]
async fn named_random_is_stable() {
    let src = "$random[1;1000000;r]\n$random[1;1000000;r]";
    let text = eval(src).await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], lines[1]);
}

#[tokio::test]
async fn configured_timezone() {
    let interp = interp();
    let eval = interp
        .evaluate("$timezone", Invocation::default(), ExecutionState::with_timezone("Asia/Tokyo"))
        .await
        .unwrap();
    assert_eq!(eval.text, "Asia/Tokyo");
}

#[tokio::test]
async fn caller_arguments() {
    let eval = interp()
        .evaluate("$args[2] / $args", Invocation::new("cmd", vec!["a".into(), "b".into()]), ExecutionState::new())
        .await
        .unwrap();
    assert_eq!(eval.text, "b / a b");
}

// ── Functions and escaping ────────────────────────────────────────────────────

#[tokio::test]
async fn names_are_case_insensitive() {
    assert_eq!(eval("$UPPER[abc] $Lower[DEF]").await.unwrap(), "ABC def");
}

#[tokio::test]
async fn nested_arguments() {
    assert_eq!(eval("$upper[$replace[a-b;-;$trim[  + ]]]").await.unwrap(), "A+B");
    assert_eq!(eval("$sum[$length[abc];$sum[1;1]]").await.unwrap(), "5");
}

/// Each worklist entry targets the first occurrence of its name, so an
/// escaped occurrence shadows every later one.
#[tokio::test]
async fn escaped_occurrence_shadows_later_calls() {
    assert_eq!(eval("$$upper[a] $upper[b]").await.unwrap(), "$$upper[a] $upper[b]");
    assert_eq!(eval("$upper[b] $$upper[a]").await.unwrap(), "B $$upper[a]");
}

#[tokio::test]
async fn results_are_not_reinterpreted() {
    let mut reg = FunctionRegistry::with_builtins();
    reg.register(FunctionDescriptor::sync("$raw", false, &[], |_, _, _| Outcome::text("$upper[x];[y]")));
    let interp = Interpreter::new(Arc::new(reg));
    let eval = interp.evaluate("$raw", Invocation::default(), ExecutionState::new()).await.unwrap();
    assert_eq!(eval.text, "$upper[x];[y]");
}

#[tokio::test]
async fn longest_name_wins() {
    let mut reg = FunctionRegistry::with_builtins();
    reg.register(FunctionDescriptor::sync("$user", false, &[], |_, _, _| Outcome::text("U")));
    reg.register(FunctionDescriptor::sync("$userTag", true, &["name"], |_, args, _| {
        Outcome::text(format!("T:{}", args[0].as_text().unwrap_or("")))
    }));
    let scanner = FunctionScanner::new(reg.names());
    assert_eq!(scanner.scan("$userTag[x]"), ["$userTag"]);

    let interp = Interpreter::new(Arc::new(reg));
    let eval = interp.evaluate("$userTag[x]", Invocation::default(), ExecutionState::new()).await.unwrap();
    assert_eq!(eval.text, "T:x");
}

#[tokio::test]
async fn sleep_then_continue() {
    assert_eq!(eval("$sleep[5]done").await.unwrap(), "done");
}

// ── Delivery ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn artifacts_are_delivered() {
    let (result, sink) = run(&interp(), "$addElement[embed;hello]$attachment[a.txt;data]").await;
    assert!(!result.error);
    assert_eq!(result.id.as_deref(), Some("msg-1"));
    let renders = sink.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].text, None);
    assert_eq!(renders[0].artifacts.elements[0].kind, ElementKind::Embed);
    assert_eq!(renders[0].artifacts.attachments[0].name, "a.txt");
}

#[tokio::test]
async fn empty_render_is_not_delivered() {
    let (result, sink) = run(&interp(), "  $let[x;1]  ").await;
    assert!(!result.error);
    assert_eq!(result.result.as_deref(), Some(""));
    assert!(sink.renders().is_empty());
}

#[tokio::test]
async fn message_override_without_delivery() {
    let (result, sink) = run(&interp(), "$useMessage[m-9]").await;
    assert_eq!(result.id.as_deref(), Some("m-9"));
    assert!(sink.renders().is_empty());
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_brackets_report_usage() {
    let (result, sink) = run(&interp(), "before $replace after").await;
    assert!(result.error);
    let diag = &sink.diagnostics()[0];
    assert_eq!(diag.message, "Invalid $replace usage: Missing brackets");
    assert_eq!(diag.hint.as_deref(), Some("Usage: $replace[text;from;to]"));
}

#[tokio::test]
async fn function_error_stops_evaluation() {
    let eval = interp()
        .evaluate("$let[x;1]$error[boom]", Invocation::default(), ExecutionState::new())
        .await;
    assert_eq!(
        eval.unwrap_err(),
        EvalError::Function { function: "$error".into(), message: "boom".into() }
    );
}

#[tokio::test]
async fn depth_limit() {
    let src = format!("{}a{}", "$upper[".repeat(70), "]".repeat(70));
    let err = eval(&src).await.unwrap_err();
    assert_eq!(err.kind(), "limit");
}

#[tokio::test]
async fn invocation_limit() {
    let limited = interp().with_limits(Limits { max_depth: 64, max_invocations: 3 });
    let src = "$upper[a] $upper[b] $upper[c] $upper[d]";
    let (result, sink) = run(&limited, src).await;
    assert!(result.error);
    assert!(sink.diagnostics()[0].message.contains("invocations"));
}
