//! Text search helpers shared by the scanner, unpacker and control-flow
//! resolver.
//!
//! Function names and control keywords are matched ASCII-case-insensitively.
//! Byte offsets returned here always fall on `char` boundaries because every
//! needle starts with the ASCII `$` marker.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

// ── Case-insensitive search ───────────────────────────────────────────────────

/// ASCII-case-insensitive substring search starting at byte `from`.
///
/// Returns the byte offset of the first occurrence of `needle` in
/// `text[from..]`, relative to the start of `text`.
pub fn find_ascii_ci(text: &str, needle: &str, from: usize) -> Option<usize> {
    let tb = text.as_bytes();
    let nb = needle.as_bytes();
    if from > tb.len() {
        return None;
    }
    if nb.is_empty() {
        return Some(from);
    }
    if nb.len() > tb.len() - from {
        return None;
    }
    (from..=tb.len() - nb.len()).find(|&i| tb[i..i + nb.len()].eq_ignore_ascii_case(nb))
}

// ── Control keywords ──────────────────────────────────────────────────────────

/// A control-flow marker recognised in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `$if[`: the opener together with its bracket.
    If,
    /// `$elseif[`
    ElseIf,
    /// `$else`
    Else,
    /// `$endif`
    EndIf,
    /// `$endelseif`
    EndElseIf,
}

impl Keyword {
    const ALL: [Keyword; 5] = [
        Keyword::If,
        Keyword::ElseIf,
        Keyword::Else,
        Keyword::EndIf,
        Keyword::EndElseIf,
    ];

    /// The keyword as written in documents (lower case).
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "$if[",
            Keyword::ElseIf => "$elseif[",
            Keyword::Else => "$else",
            Keyword::EndIf => "$endif",
            Keyword::EndElseIf => "$endelseif",
        }
    }

    fn regex(self) -> &'static Regex {
        static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
        let all = COMPILED.get_or_init(|| {
            Keyword::ALL
                .iter()
                .map(|k| {
                    Regex::new(&format!("(?i){}", regex::escape(k.as_str())))
                        .expect("keyword patterns are valid regexes")
                })
                .collect()
        });
        &all[self as usize]
    }

    /// First occurrence at or after byte `from`.
    pub fn find(self, text: &str, from: usize) -> Option<Range<usize>> {
        if from > text.len() {
            return None;
        }
        self.regex().find_at(text, from).map(|m| m.range())
    }

    /// Every non-overlapping occurrence, left to right.
    pub fn find_all(self, text: &str) -> impl Iterator<Item = Range<usize>> + '_ {
        self.regex().find_iter(text).map(|m| m.range())
    }

    /// Last occurrence anywhere in `text`.
    pub fn rfind(self, text: &str) -> Option<Range<usize>> {
        self.find_all(text).last()
    }

    /// Returns `true` if the keyword occurs anywhere in `text`.
    pub fn is_present(self, text: &str) -> bool {
        self.regex().is_match(text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
