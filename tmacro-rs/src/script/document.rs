//! The document buffer being evaluated.
//!
//! A [`Document`] is flat text plus a record of which byte ranges are
//! *literal*: escaped function results spliced in by the interpreter.  The
//! rest is *source* that may still contain invocations.  Name searches and
//! marker checks only look at source text, so a result can never be read
//! back as syntax even when it happens to spell a function name.

use std::ops::Range;

use crate::pattern::find_ascii_ci;

use super::escape::is_marker;

/// A borrowed piece of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment<'a> {
    Source(&'a str),
    Literal(&'a str),
}

impl<'a> Fragment<'a> {
    pub fn as_str(self) -> &'a str {
        match self {
            Fragment::Source(s) | Fragment::Literal(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    text: String,
    /// Sorted, non-overlapping, non-empty.
    literals: Vec<Range<usize>>,
}

impl Document {
    /// A document made entirely of source text.
    pub fn new(source: impl Into<String>) -> Self {
        Document { text: source.into(), literals: Vec::new() }
    }

    /// A document made entirely of literal text.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let literals = if text.is_empty() { Vec::new() } else { vec![0..text.len()] };
        Document { text, literals }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns `true` if byte `pos` lies inside a literal fragment.
    pub fn is_literal_at(&self, pos: usize) -> bool {
        self.literals.iter().any(|r| r.contains(&pos))
    }

    /// Iterate over the source and literal pieces in order.
    pub fn fragments(&self) -> impl Iterator<Item = Fragment<'_>> + '_ {
        let mut out = Vec::with_capacity(self.literals.len() * 2 + 1);
        let mut pos = 0;
        for r in &self.literals {
            if r.start > pos {
                out.push(Fragment::Source(&self.text[pos..r.start]));
            }
            out.push(Fragment::Literal(&self.text[r.clone()]));
            pos = r.end;
        }
        if pos < self.text.len() {
            out.push(Fragment::Source(&self.text[pos..]));
        }
        out.into_iter()
    }

    /// Returns `true` if any source fragment contains a marker character.
    pub fn has_markers(&self) -> bool {
        self.fragments().any(|f| match f {
            Fragment::Source(s) => s.chars().any(is_marker),
            Fragment::Literal(_) => false,
        })
    }

    /// First case-insensitive occurrence of `name` at or after `from` that
    /// starts in source text.
    pub fn find_name(&self, name: &str, from: usize) -> Option<usize> {
        let mut at = from;
        loop {
            let pos = find_ascii_ci(&self.text, name, at)?;
            if !self.is_literal_at(pos) {
                return Some(pos);
            }
            at = pos + 1;
        }
    }

    /// Copy out `range`, keeping its literal fragments.
    pub fn slice(&self, range: Range<usize>) -> Document {
        let literals = self
            .literals
            .iter()
            .filter_map(|r| {
                let start = r.start.max(range.start);
                let end = r.end.min(range.end);
                (start < end).then(|| start - range.start..end - range.start)
            })
            .collect();
        Document { text: self.text[range].to_owned(), literals }
    }

    /// Concatenate several ranges of this document.
    pub fn gather(&self, ranges: &[Range<usize>]) -> Document {
        let mut out = Document::default();
        for r in ranges {
            out.push(self.slice(r.clone()));
        }
        out
    }

    /// Append `other` to the end of this document.
    pub fn push(&mut self, other: Document) {
        let offset = self.text.len();
        self.text.push_str(&other.text);
        for r in other.literals {
            self.add_literal(r.start + offset..r.end + offset);
        }
    }

    fn add_literal(&mut self, r: Range<usize>) {
        if r.is_empty() {
            return;
        }
        match self.literals.last_mut() {
            Some(last) if last.end == r.start => last.end = r.end,
            _ => self.literals.push(r),
        }
    }

    /// Replace `range` with `replacement`.
    pub fn splice(&mut self, range: Range<usize>, replacement: Document) {
        let mut tail = self.slice(range.end..self.text.len());
        let keep = self.slice(0..range.start);
        *self = keep;
        self.push(replacement);
        self.push(std::mem::take(&mut tail));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
