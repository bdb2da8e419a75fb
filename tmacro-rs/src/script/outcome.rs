//! Results of function calls and the side-channel artifacts they carry.

use std::fmt;
use std::str::FromStr;

// ── Artifacts ─────────────────────────────────────────────────────────────────

/// Kind of a structured display element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Embed,
    Component,
    Sticker,
}

impl FromStr for ElementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embed" => Ok(ElementKind::Embed),
            "component" => Ok(ElementKind::Component),
            "sticker" => Ok(ElementKind::Sticker),
            other => Err(format!("unknown element kind '{other}'")),
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::Embed => "embed",
            ElementKind::Component => "component",
            ElementKind::Sticker => "sticker",
        })
    }
}

/// A structured display element handed to the rendering sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    pub content: String,
}

/// A file attached to the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub data: Vec<u8>,
}

/// Artifacts accumulated over one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub elements: Vec<Element>,
    pub attachments: Vec<Attachment>,
    pub flags: Option<String>,
    /// Identifier of a message that replaces the delivered one.
    pub message: Option<String>,
}

impl Artifacts {
    /// Overwrite every field the patch carries.  Fields are replaced, never
    /// merged.
    pub fn apply(&mut self, patch: ArtifactPatch) {
        if let Some(elements) = patch.elements {
            self.elements = elements;
        }
        if let Some(attachments) = patch.attachments {
            self.attachments = attachments;
        }
        if patch.flags.is_some() {
            self.flags = patch.flags;
        }
        if patch.message.is_some() {
            self.message = patch.message;
        }
    }

    /// Returns `true` if there is something to deliver besides text.
    pub fn has_content(&self) -> bool {
        !self.elements.is_empty() || !self.attachments.is_empty()
    }
}

/// The artifact fields one call wants to replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPatch {
    pub elements: Option<Vec<Element>>,
    pub attachments: Option<Vec<Attachment>>,
    pub flags: Option<String>,
    pub message: Option<String>,
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// The result of one function call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Replacement text; `None` splices an empty string.
    Value(Option<String>),
    /// Replacement text plus artifacts that overwrite the accumulated ones.
    WithArtifacts {
        value: Option<String>,
        artifacts: ArtifactPatch,
    },
    /// The call failed; evaluation stops without a render.
    Error(String),
}

impl Outcome {
    pub fn empty() -> Self {
        Outcome::Value(None)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Outcome::Value(Some(s.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error(message.into())
    }

    pub fn artifacts(artifacts: ArtifactPatch) -> Self {
        Outcome::WithArtifacts { value: None, artifacts }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Outcome::Value(Some(s))
    }
}

impl From<&str> for Outcome {
    fn from(s: &str) -> Self {
        Outcome::Value(Some(s.to_owned()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
