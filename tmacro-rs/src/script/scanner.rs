//! Builds the name worklist the interpreter consumes.
//!
//! Each line is split on `$`; every non-blank segment that follows a `$` is
//! matched against the registered names (plus `$if` and `$endif`) as a
//! prefix of `"$" + segment`.  When several names match, the longest wins,
//! so `$userTag[x]` selects `$userTag` over `$user`.
//!
//! Matches are emitted rightmost-first within a line, lines top to bottom.
//! The worklist holds names, not positions: the interpreter locates each
//! entry by its first remaining occurrence in the document.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

/// Control keywords the scanner recognises in addition to registered names.
pub const CONTROL_NAMES: [&str; 2] = ["$if", "$endif"];

/// Longest-prefix function-name matcher.
#[derive(Debug)]
pub struct FunctionScanner {
    names: Vec<String>,
    automaton: AhoCorasick,
}

impl FunctionScanner {
    /// Build a scanner over `names` (each `$`-prefixed) and the control
    /// keywords.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut all: Vec<String> = names.into_iter().map(str::to_owned).collect();
        for control in CONTROL_NAMES {
            if !all.iter().any(|n| n.eq_ignore_ascii_case(control)) {
                all.push(control.to_owned());
            }
        }
        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&all);
        FunctionScanner { names: all, automaton }
    }

    /// Returns the longest name that is a prefix of `"$" + segment`.
    fn match_segment(&self, segment: &str) -> Option<&str> {
        let haystack = format!("${segment}");
        // `segment` has no `$`, so any match starts at 0.
        self.automaton
            .find(&haystack)
            .filter(|m| m.start() == 0)
            .map(|m| self.names[m.pattern()].as_str())
    }

    /// Produce the ordered worklist for `text`.
    pub fn scan(&self, text: &str) -> Vec<&str> {
        let mut worklist = Vec::new();
        for line in text.split('\n') {
            let start = worklist.len();
            // The first piece precedes any `$` and is never a candidate.
            for segment in line.split('$').skip(1) {
                if segment.trim().is_empty() {
                    continue;
                }
                if let Some(name) = self.match_segment(segment) {
                    worklist.push(name);
                }
            }
            worklist[start..].reverse();
        }
        worklist
    }
}

/// Returns `true` for the names that hand control to the block resolver.
pub fn is_control(name: &str) -> bool {
    CONTROL_NAMES.iter().any(|c| c.eq_ignore_ascii_case(name))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner(names: &[&str]) -> FunctionScanner {
        FunctionScanner::new(names.iter().copied())
    }

    #[test]
    fn longest_prefix_wins() {
        let s = scanner(&["$user", "$userTag"]);
        assert_eq!(s.scan("$userTag[x]"), ["$userTag"]);
        assert_eq!(s.scan("$user[x]"), ["$user"]);
        assert_eq!(s.scan("$usernames"), ["$user"]);
    }

    #[test]
    fn case_insensitive() {
        let s = scanner(&["$upper"]);
        assert_eq!(s.scan("$UPPER[a] $Upper[b]"), ["$upper", "$upper"]);
    }

    #[test]
    fn reversed_within_line_in_line_order() {
        let s = scanner(&["$a", "$b", "$c"]);
        assert_eq!(s.scan("$a $b\n$c"), ["$b", "$a", "$c"]);
    }

    #[test]
    fn nested_call_is_listed_first() {
        let s = scanner(&["$upper", "$lower"]);
        assert_eq!(s.scan("$upper[$lower[X]]"), ["$lower", "$upper"]);
    }

    #[test]
    fn control_keywords_included() {
        let s = scanner(&[]);
        assert_eq!(s.scan("$if[1==1]A$else B$endif"), ["$endif", "$if"]);
        assert!(is_control("$IF"));
        assert!(is_control("$endif"));
        assert!(!is_control("$else"));
    }

    #[test]
    fn text_before_first_marker_is_ignored() {
        let s = scanner(&["$hello"]);
        assert!(s.scan("hello world").is_empty());
        assert!(s.scan("if this then that").is_empty());
    }

    #[test]
    fn unknown_and_blank_segments_skipped() {
        let s = scanner(&["$a"]);
        assert!(s.scan("$$ $ $zzz").is_empty());
        assert!(s.scan("").is_empty());
    }

    #[test]
    fn duplicate_control_names_not_doubled() {
        let s = scanner(&["$IF"]);
        assert_eq!(s.names.len(), 2);
    }
}
