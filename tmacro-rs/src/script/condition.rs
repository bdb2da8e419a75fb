//! Boolean condition language used by `$if` / `$elseif` / `$checkCondition`.
//!
//! A condition is a sequence of comparisons joined by `&&` and `||`, with
//! parentheses for grouping:
//!
//! ```text
//! (1==1 && abc!=abd) || 5>=10
//! ```
//!
//! Every text run between the structural tokens is one comparison.  Its
//! operator is chosen by testing `==`, `!=`, `>=`, `<=`, `>`, `<` **in that
//! order**, so `>=` is never read as `>`.  A run with no operator is `false`.
//!
//! Precedence (lowest → highest):  `||`  →  `&&`  →  group / comparison
//!
//! Malformed input never aborts an evaluation: [`evaluate`] maps every
//! [`ConditionError`] to `false`.  Unbalanced `(` are closed automatically.
//!
//! `&&` and `||` chains parse into flat term lists, so only parenthesised
//! groups add depth.  Groups nest at most [`MAX_NESTING`] deep.

use std::cmp::Ordering;

use thiserror::Error;

use super::escape::unescape;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a condition string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,
    #[error("unexpected {0}")]
    Unexpected(String),
    #[error("groups nested deeper than {0}")]
    TooDeep(usize),
}

/// Deepest allowed `(` nesting.
pub const MAX_NESTING: usize = 256;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// A run of operand/comparison text (already non-blank).
    Text(String),
    And,
    Or,
    LParen,
    RParen,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Text(t) => format!("'{t}'"),
            Token::And => "'&&'".into(),
            Token::Or => "'||'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Eof => "end of condition".into(),
        }
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Length of the structural token at the cursor, if any.
    fn structural(&self) -> Option<(Token, usize)> {
        let rest = self.rest();
        if rest.starts_with("&&") {
            Some((Token::And, 2))
        } else if rest.starts_with("||") {
            Some((Token::Or, 2))
        } else if rest.starts_with('(') {
            Some((Token::LParen, 1))
        } else if rest.starts_with(')') {
            Some((Token::RParen, 1))
        } else {
            None
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut text = String::new();
        while self.pos < self.src.len() {
            if let Some((tok, len)) = self.structural() {
                flush_text(&mut text, &mut tokens);
                tokens.push(tok);
                self.pos += len;
                continue;
            }
            let Some(ch) = self.rest().chars().next() else { break };
            text.push(ch);
            self.pos += ch.len_utf8();
        }
        flush_text(&mut text, &mut tokens);
        tokens.push(Token::Eof);
        tokens
    }
}

fn flush_text(text: &mut String, tokens: &mut Vec<Token>) {
    let taken = std::mem::take(text);
    if !taken.trim().is_empty() {
        tokens.push(Token::Text(taken));
    }
}

/// Append one `)` for every `(` that is never closed.
fn auto_close(tokens: &mut Vec<Token>) {
    let opens = tokens.iter().filter(|t| **t == Token::LParen).count();
    let closes = tokens.iter().filter(|t| **t == Token::RParen).count();
    if opens > closes {
        let eof = tokens.pop();
        tokens.extend(std::iter::repeat(Token::RParen).take(opens - closes));
        tokens.extend(eof);
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

/// Comparison operator, listed in matching priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

const OPERATORS: [(&str, CmpOp); 6] = [
    ("==", CmpOp::Eq),
    ("!=", CmpOp::Ne),
    (">=", CmpOp::Ge),
    ("<=", CmpOp::Le),
    (">", CmpOp::Gt),
    ("<", CmpOp::Lt),
];

/// One `lhs OP rhs` test.  Operands are trimmed and unescaped.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub lhs: String,
    pub op: CmpOp,
    pub rhs: String,
}

impl Comparison {
    /// Parse a comparison from a text run, or `None` if it has no operator.
    pub fn parse(text: &str) -> Option<Self> {
        let (sym, op) = OPERATORS.iter().find(|(sym, _)| text.contains(sym))?;
        let mut parts = text.split(sym);
        let lhs = parts.next().unwrap_or("");
        let rhs = parts.next().unwrap_or("");
        Some(Comparison {
            lhs: unescape(lhs.trim()),
            op: *op,
            rhs: unescape(rhs.trim()),
        })
    }

    /// Equality is textual.  Relational operators compare numerically when
    /// both operands are finite numbers, and by string order otherwise.
    pub fn holds(&self) -> bool {
        match self.op {
            CmpOp::Eq => self.lhs == self.rhs,
            CmpOp::Ne => self.lhs != self.rhs,
            op => {
                let ord = match (as_number(&self.lhs), as_number(&self.rhs)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => Some(self.lhs.as_str().cmp(self.rhs.as_str())),
                };
                let Some(ord) = ord else { return false };
                match op {
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Ge => ord != Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
                }
            }
        }
    }
}

fn as_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    /// A text run without a comparison operator.
    Literal(bool),
    Compare(Comparison),
    /// Two or more terms joined by `&&`.
    And(Vec<CondExpr>),
    /// Two or more terms joined by `||`.
    Or(Vec<CondExpr>),
}

impl CondExpr {
    /// Evaluate left to right with short-circuiting.
    pub fn eval(&self) -> bool {
        match self {
            CondExpr::Literal(b) => *b,
            CondExpr::Compare(c) => c.holds(),
            CondExpr::And(terms) => terms.iter().all(CondExpr::eval),
            CondExpr::Or(terms) => terms.iter().any(CondExpr::eval),
        }
    }

    /// A single term stands alone; more are wrapped with `wrap`.
    fn join(mut terms: Vec<CondExpr>, wrap: fn(Vec<CondExpr>) -> CondExpr) -> CondExpr {
        match terms.len() {
            1 => terms.pop().unwrap_or(CondExpr::Literal(false)),
            _ => wrap(terms),
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open groups at the cursor.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<CondExpr, ConditionError> {
        let mut terms = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            terms.push(self.parse_and()?);
        }
        Ok(CondExpr::join(terms, CondExpr::Or))
    }

    fn parse_and(&mut self) -> Result<CondExpr, ConditionError> {
        let mut terms = vec![self.parse_primary()?];
        while self.eat(&Token::And) {
            terms.push(self.parse_primary()?);
        }
        Ok(CondExpr::join(terms, CondExpr::And))
    }

    fn parse_primary(&mut self) -> Result<CondExpr, ConditionError> {
        match self.advance() {
            Token::Text(text) => Ok(match Comparison::parse(&text) {
                Some(cmp) => CondExpr::Compare(cmp),
                None => CondExpr::Literal(false),
            }),
            Token::LParen => {
                if self.depth >= MAX_NESTING {
                    return Err(ConditionError::TooDeep(MAX_NESTING));
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(ConditionError::Unexpected(self.peek().describe()));
                }
                Ok(inner)
            }
            other => Err(ConditionError::Unexpected(other.describe())),
        }
    }
}

/// Parse a condition string into a [`CondExpr`].
pub fn parse(src: &str) -> Result<CondExpr, ConditionError> {
    if src.trim().is_empty() {
        return Err(ConditionError::Empty);
    }
    let mut tokens = Lexer::new(src).tokenize();
    auto_close(&mut tokens);
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(ConditionError::Unexpected(other.describe())),
    }
}

/// Parse and evaluate `src`; malformed conditions are `false`.
pub fn evaluate(src: &str) -> bool {
    match parse(src) {
        Ok(expr) => expr.eval(),
        Err(e) => {
            tracing::trace!(condition = src, error = %e, "malformed condition treated as false");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
