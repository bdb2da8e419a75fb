//! `$if` block extraction.
//!
//! ```text
//! $if[cond] body ($elseif[cond] body $endelseif)* ($else body)? $endif
//! ```
//!
//! [`find_innermost_block`] locates the region opened by the **last** `$if[`
//! and closed by the first `$endif` after it.  That region cannot contain
//! another `$if[`, so resolving it first flattens nested blocks from the
//! inside out.  Conditions are delimited by bracket depth, so a condition
//! may itself contain bracketed invocations.
//!
//! Each `$elseif` sub-block is cut out of the region.  What remains is split
//! at the first `$else` into the if-body and the else-body.  Bodies are
//! returned as lists of ranges because cutting out an `$elseif` can leave
//! the if-body in more than one piece.
//!
//! `$endelseif` is optional unless `require_endelseif` is set; without it an
//! `$elseif` body ends at the next `$elseif[`, `$else` or the region's end.
//!
//! This module only parses.  Branch selection lives in the interpreter,
//! which must resolve conditions through the function pipeline.

use std::ops::Range;

use thiserror::Error;

use crate::pattern::Keyword;

use super::unpack::matching_bracket;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A malformed control block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("Invalid $if usage: Missing $endif")]
    MissingEndIf,
    #[error("Invalid $if usage: Missing $if[ before $endif")]
    MissingIf,
    #[error("Invalid $if usage: Unclosed condition bracket")]
    UnclosedCondition,
    #[error("Invalid $elseif usage: Missing $endelseif")]
    MissingEndElseIf,
    #[error("Invalid $elseif usage: Unclosed condition bracket")]
    UnclosedElseIfCondition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElseIf {
    pub condition: Range<usize>,
    pub body: Range<usize>,
}

/// One `$if ... $endif` region as byte ranges into the searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfBlock {
    /// From `$if[` through the end of `$endif`.
    pub span: Range<usize>,
    pub condition: Range<usize>,
    pub if_body: Vec<Range<usize>>,
    /// In document order.
    pub elseifs: Vec<ElseIf>,
    /// Empty when there is no `$else`.
    pub else_body: Vec<Range<usize>>,
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Find the innermost `$if` block in `text`.
pub fn find_innermost_block(text: &str, require_endelseif: bool) -> Result<IfBlock, StructuralError> {
    if !Keyword::EndIf.is_present(text) {
        return Err(StructuralError::MissingEndIf);
    }
    let opener = Keyword::If.rfind(text).ok_or(StructuralError::MissingIf)?;
    let close = matching_bracket(text, opener.end - 1).ok_or(StructuralError::UnclosedCondition)?;
    let endif = Keyword::EndIf.find(text, close + 1).ok_or(StructuralError::MissingEndIf)?;

    let region = close + 1..endif.start;
    let (parts, elseifs) = collect_elseifs(text, region, require_endelseif)?;
    let (if_body, else_body) = split_at_else(text, parts);

    Ok(IfBlock {
        span: opener.start..endif.end,
        condition: opener.end..close,
        if_body,
        elseifs,
        else_body,
    })
}

/// Returns `true` if `pos` lies inside an `$if[` that no `$endif` before
/// `pos` has closed.
pub fn is_inside_block(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    let mut marks: Vec<(usize, bool)> = Keyword::If
        .find_all(before)
        .map(|r| (r.start, true))
        .chain(Keyword::EndIf.find_all(before).map(|r| (r.start, false)))
        .collect();
    marks.sort_unstable();
    let depth = marks.iter().fold(0usize, |depth, &(_, open)| {
        if open { depth + 1 } else { depth.saturating_sub(1) }
    });
    depth > 0
}

/// Cut every `$elseif` sub-block out of `region`.  Returns the remaining
/// pieces of the region and the sub-blocks.
fn collect_elseifs(
    text: &str,
    region: Range<usize>,
    require_endelseif: bool,
) -> Result<(Vec<Range<usize>>, Vec<ElseIf>), StructuralError> {
    let mut parts = Vec::new();
    let mut elseifs = Vec::new();
    let mut pos = region.start;

    while let Some(kw) = Keyword::ElseIf.find(text, pos).filter(|r| r.end <= region.end) {
        push_part(&mut parts, pos..kw.start);
        let close = matching_bracket(text, kw.end - 1)
            .filter(|&c| c < region.end)
            .ok_or(StructuralError::UnclosedElseIfCondition)?;
        let condition = kw.end..close;
        let body_start = close + 1;
        let next = Keyword::ElseIf
            .find(text, body_start)
            .map(|r| r.start)
            .filter(|&s| s < region.end)
            .unwrap_or(region.end);

        match Keyword::EndElseIf.find(text, body_start).filter(|r| r.end <= next) {
            Some(end) => {
                elseifs.push(ElseIf { condition, body: body_start..end.start });
                pos = end.end;
            }
            None if require_endelseif => return Err(StructuralError::MissingEndElseIf),
            None => {
                let stop = find_else(text, body_start..next).map_or(next, |r| r.start);
                elseifs.push(ElseIf { condition, body: body_start..stop });
                pos = stop;
            }
        }
    }
    push_part(&mut parts, pos..region.end);
    Ok((parts, elseifs))
}

/// Split the remaining pieces at the first `$else`.
fn split_at_else(text: &str, parts: Vec<Range<usize>>) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    for (i, part) in parts.iter().enumerate() {
        if let Some(kw) = find_else(text, part.clone()) {
            let mut if_body = parts[..i].to_vec();
            push_part(&mut if_body, part.start..kw.start);
            let mut else_body = Vec::new();
            push_part(&mut else_body, kw.end..part.end);
            else_body.extend_from_slice(&parts[i + 1..]);
            return (if_body, else_body);
        }
    }
    (parts, Vec::new())
}

/// First `$else` inside `within` that is not the start of `$elseif`.
fn find_else(text: &str, within: Range<usize>) -> Option<Range<usize>> {
    let mut at = within.start;
    while let Some(r) = Keyword::Else.find(text, at) {
        if r.end > within.end {
            return None;
        }
        let elseif = text[r.end..].get(..2).is_some_and(|s| s.eq_ignore_ascii_case("if"));
        if !elseif {
            return Some(r);
        }
        at = r.end;
    }
    None
}

fn push_part(parts: &mut Vec<Range<usize>>, r: Range<usize>) {
    if !r.is_empty() {
        parts.push(r);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
