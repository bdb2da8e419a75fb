//! Where finished evaluations and diagnostics go.
//!
//! The interpreter never formats or transmits anything itself.  A successful
//! render is handed to a [`RenderSink`]; a fatal error is reported to a
//! [`DiagnosticSink`].
//!
//! | Sink | Render | Diagnostics |
//! |------|--------|-------------|
//! | [`TerminalSink`] | stdout, artifacts summarised | stderr, red on a tty |
//! | [`MemorySink`] | collected | collected |

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use crossterm::queue;
use crossterm::style::{Color, ContentStyle, Print, ResetColor, SetStyle};

use crate::script::{Artifacts, Diagnostic};

// ── Render ────────────────────────────────────────────────────────────────────

/// A finished evaluation ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Render {
    /// `None` when the rendered text is empty.
    pub text: Option<String>,
    pub artifacts: Artifacts,
}

/// Delivers renders.  Returns the id of the delivered message, if the
/// transport assigns one.
#[async_trait]
pub trait RenderSink: Send + Sync {
    async fn deliver(&self, render: Render) -> Result<Option<String>, String>;
}

/// Receives fatal-error reports.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

// ── TerminalSink ──────────────────────────────────────────────────────────────

/// Writes renders to stdout and diagnostics to stderr.
#[derive(Debug, Clone, Copy)]
pub struct TerminalSink {
    color: bool,
}

impl TerminalSink {
    /// `color` is honoured only when stderr is a terminal.
    pub fn new(color: bool) -> Self {
        let is_tty = unsafe { libc::isatty(libc::STDERR_FILENO) != 0 };
        TerminalSink { color: color && is_tty }
    }
}

/// One line per artifact, e.g. `[embed] {...}` or `[attachment] a.txt (12 bytes)`.
pub fn summarize_artifacts(artifacts: &Artifacts) -> Vec<String> {
    let mut lines = Vec::new();
    for el in &artifacts.elements {
        lines.push(format!("[{}] {}", el.kind, el.content));
    }
    for att in &artifacts.attachments {
        lines.push(format!("[attachment] {} ({} bytes)", att.name, att.data.len()));
    }
    if let Some(flags) = &artifacts.flags {
        lines.push(format!("[flags] {flags}"));
    }
    lines
}

#[async_trait]
impl RenderSink for TerminalSink {
    async fn deliver(&self, render: Render) -> Result<Option<String>, String> {
        let mut out = std::io::stdout().lock();
        if let Some(text) = &render.text {
            writeln!(out, "{text}").map_err(|e| e.to_string())?;
        }
        for line in summarize_artifacts(&render.artifacts) {
            writeln!(out, "{line}").map_err(|e| e.to_string())?;
        }
        out.flush().map_err(|e| e.to_string())?;
        Ok(None)
    }
}

impl DiagnosticSink for TerminalSink {
    fn report(&self, diagnostic: &Diagnostic) {
        let line = format!("tmacro: {diagnostic}");
        let mut err = std::io::stderr().lock();
        let written = if self.color {
            let style = ContentStyle { foreground_color: Some(Color::Red), ..ContentStyle::new() };
            queue!(err, SetStyle(style), Print(&line), ResetColor, Print("\n"))
        } else {
            writeln!(err, "{line}")
        };
        if written.and_then(|()| err.flush()).is_err() {
            tracing::warn!(diagnostic = %diagnostic, "could not write diagnostic to stderr");
        }
    }
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// Collects everything it receives.  Delivered renders are numbered
/// `msg-1`, `msg-2`, ... and that id is returned.
#[derive(Debug, Default)]
pub struct MemorySink {
    renders: Mutex<Vec<Render>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> Vec<Render> {
        self.renders.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RenderSink for MemorySink {
    async fn deliver(&self, render: Render) -> Result<Option<String>, String> {
        let mut renders = self.renders.lock().map_err(|e| e.to_string())?;
        renders.push(render);
        Ok(Some(format!("msg-{}", renders.len())))
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &Diagnostic) {
        if let Ok(mut d) = self.diagnostics.lock() {
            d.push(diagnostic.clone());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Attachment, Element, ElementKind};

    #[test]
    fn summary_lines() {
        let artifacts = Artifacts {
            elements: vec![Element { kind: ElementKind::Embed, content: "title".into() }],
            attachments: vec![Attachment { name: "a.txt".into(), data: vec![0; 12] }],
            flags: Some("64".into()),
            message: None,
        };
        assert_eq!(
            summarize_artifacts(&artifacts),
            ["[embed] title", "[attachment] a.txt (12 bytes)", "[flags] 64"]
        );
    }

    #[tokio::test]
    async fn memory_sink_numbers_renders() {
        let sink = MemorySink::new();
        let render = Render { text: Some("hi".into()), artifacts: Artifacts::default() };
        assert_eq!(sink.deliver(render.clone()).await, Ok(Some("msg-1".into())));
        assert_eq!(sink.deliver(render).await, Ok(Some("msg-2".into())));
        assert_eq!(sink.renders().len(), 2);
    }

    #[test]
    fn memory_sink_collects_diagnostics() {
        let sink = MemorySink::new();
        sink.report(&Diagnostic { message: "bad".into(), hint: None });
        assert_eq!(sink.diagnostics()[0].message, "bad");
    }
}
