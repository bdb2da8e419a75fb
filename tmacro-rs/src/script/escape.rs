//! Literal escaping for the four marker characters.
//!
//! Function results are escaped before they are spliced back into a
//! document, so returned text can never be read as new syntax.  The final
//! render is unescaped exactly once.
//!
//! | Raw | Encoded   |
//! |-----|-----------|
//! | `$` | `#CHAR#`  |
//! | `[` | `#LEFT#`  |
//! | `]` | `#RIGHT#` |
//! | `;` | `#SEMI#`  |
//! | `#` | `#HASH#`  |
//!
//! `#` itself is encoded so that text which already looks like an encoded
//! form survives a round trip: `unescape(&escape(s)) == s` for every `s`.

/// Characters reserved for document syntax.
pub const MARKERS: [char; 4] = ['$', '[', ']', ';'];

const CODES: [(&str, char); 5] = [
    ("#CHAR#", '$'),
    ("#LEFT#", '['),
    ("#RIGHT#", ']'),
    ("#SEMI#", ';'),
    ("#HASH#", '#'),
];

/// Returns `true` if `c` is one of `$ [ ] ;`.
pub fn is_marker(c: char) -> bool {
    MARKERS.contains(&c)
}

/// Returns `true` if `s` contains any marker character.
pub fn contains_marker(s: &str) -> bool {
    s.chars().any(is_marker)
}

/// Encode marker characters (and `#`) as their literal forms.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match CODES.iter().find(|(_, raw)| *raw == ch) {
            Some((code, _)) => out.push_str(code),
            None => out.push(ch),
        }
    }
    out
}

/// Decode literal forms back to raw characters.
///
/// A `#` that does not start a known code is copied through unchanged.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('#') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match CODES.iter().find(|(code, _)| tail.starts_with(code)) {
            Some((code, raw)) => {
                out.push(*raw);
                rest = &tail[code.len()..];
            }
            None => {
                out.push('#');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
