//! Locating one invocation and splitting its argument list.
//!
//! Spans and argument ranges are byte ranges into the document that was
//! searched; arguments are returned raw (still escaped) so the interpreter
//! can decide whether they need resolving.

use std::ops::Range;

use super::document::Document;
use super::escape::is_marker;

/// What [`unpack`] found for a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unpacked {
    /// The name does not occur in source text.
    NotFound,
    /// The first occurrence is preceded by `$` and is literal text.
    Escaped { at: usize },
    /// An opening `[` is never balanced before the end of the document.
    Unterminated { at: usize },
    /// The name without an argument list.
    Bare { span: Range<usize> },
    /// `$name[...]`.  `None` marks an empty argument slot.
    Call {
        span: Range<usize>,
        args: Vec<Option<Range<usize>>>,
    },
}

/// Find the first occurrence of `name` in `doc` and describe its invocation.
pub fn unpack(doc: &Document, name: &str) -> Unpacked {
    let text = doc.as_str();
    let Some(start) = doc.find_name(name, 0) else {
        return Unpacked::NotFound;
    };
    if text[..start].ends_with('$') {
        return Unpacked::Escaped { at: start };
    }
    let name_end = start + name.len();
    let bare = Unpacked::Bare { span: start..name_end };

    let Some(open) = text[name_end..].find('[').map(|i| name_end + i) else {
        return bare;
    };
    if text[name_end..open].chars().any(is_marker) {
        return bare;
    }
    let Some(close) = matching_bracket(text, open) else {
        return Unpacked::Unterminated { at: start };
    };

    Unpacked::Call { span: start..close + 1, args: split_args(text, open + 1..close) }
}

/// Byte offset of the `]` that balances the `[` at `open`.
pub fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `text[interior]` on depth-zero `;`.
///
/// Each argument is trimmed; an empty slot is `None`.  A trailing empty
/// argument is dropped, so `[]` has no arguments and `[a;]` has one.
pub fn split_args(text: &str, interior: Range<usize>) -> Vec<Option<Range<usize>>> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut piece_start = interior.start;
    for (i, b) in text[interior.clone()].bytes().enumerate() {
        let at = interior.start + i;
        match b {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => {
                pieces.push(trim_range(text, piece_start..at));
                piece_start = at + 1;
            }
            _ => {}
        }
    }
    let last = trim_range(text, piece_start..interior.end);
    if !last.is_empty() {
        pieces.push(last);
    }
    pieces.into_iter().map(|r| (!r.is_empty()).then_some(r)).collect()
}

fn trim_range(text: &str, r: Range<usize>) -> Range<usize> {
    let piece = &text[r.clone()];
    let lead = piece.len() - piece.trim_start().len();
    let trail = piece.len() - piece.trim_end().len();
    if lead == piece.len() {
        return r.start..r.start;
    }
    r.start + lead..r.end - trail
}

// ── Tests ─────────────────────────────────────────────────────────────────────
