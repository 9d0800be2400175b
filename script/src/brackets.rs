use std::fmt;
use std::str::CharIndices;

use crate::parser::error::{ParseError, ParseErrorKind};

// ---------------------------------------------------------------------------
// Bracket families
// ---------------------------------------------------------------------------

/// One of the three bracket families the script grammar nests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BracketPair {
    /// `()`
    Paren,
    /// `[]`
    Square,
    /// `{}`
    Brace,
}

impl BracketPair {
    pub const ALL: [BracketPair; 3] = [BracketPair::Paren, BracketPair::Square, BracketPair::Brace];

    pub fn open(self) -> char {
        match self {
            BracketPair::Paren => '(',
            BracketPair::Square => '[',
            BracketPair::Brace => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            BracketPair::Paren => ')',
            BracketPair::Square => ']',
            BracketPair::Brace => '}',
        }
    }

    pub fn from_open(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|pair| pair.open() == c)
    }

    pub fn from_close(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|pair| pair.close() == c)
    }

    /// Parse a two-character pair spec such as `"()"`.
    pub fn parse(spec: &str) -> Result<Self, ParseError> {
        let mut chars = spec.chars();
        let (open, close) = (chars.next(), chars.next());
        if chars.next().is_some() {
            return Err(ParseError::new(ParseErrorKind::UnknownBracket, spec));
        }
        Self::ALL
            .into_iter()
            .find(|pair| open == Some(pair.open()) && close == Some(pair.close()))
            .ok_or_else(|| ParseError::new(ParseErrorKind::UnknownBracket, spec))
    }
}

impl fmt::Display for BracketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.open(), self.close())
    }
}

// ---------------------------------------------------------------------------
// String literals
// ---------------------------------------------------------------------------

/// Follows single-quoted string literals through a character stream.
///
/// A quote only opens a literal at the start of the text or after
/// whitespace, an operator, a comma or an opening bracket. After an
/// identifier or a closing bracket it is the transpose operator.
#[derive(Debug, Default, Clone)]
pub struct LiteralTracker {
    in_literal: bool,
    previous: Option<char>,
}

impl LiteralTracker {
    /// Feed the next character. Returns true when it belongs to a literal,
    /// its quotes included.
    pub fn step(&mut self, c: char) -> bool {
        let quoted = if self.in_literal {
            if c == '\'' {
                self.in_literal = false;
            }
            true
        } else if c == '\'' && opens_literal(self.previous) {
            self.in_literal = true;
            true
        } else {
            false
        };
        self.previous = Some(c);
        quoted
    }

    pub fn in_literal(&self) -> bool {
        self.in_literal
    }
}

fn opens_literal(previous: Option<char>) -> bool {
    match previous {
        None => true,
        Some(c) => c.is_whitespace() || "([{,=+-*/^<>;:&|~".contains(c),
    }
}

/// Characters of `text` that sit outside string literals, with byte offsets.
pub struct Unquoted<'a> {
    chars: CharIndices<'a>,
    tracker: LiteralTracker,
}

impl Iterator for Unquoted<'_> {
    type Item = (usize, char);

    fn next(&mut self) -> Option<Self::Item> {
        for (i, c) in self.chars.by_ref() {
            if !self.tracker.step(c) {
                return Some((i, c));
            }
        }
        None
    }
}

pub fn unquoted(text: &str) -> Unquoted<'_> {
    Unquoted {
        chars: text.char_indices(),
        tracker: LiteralTracker::default(),
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Byte offsets of a matched open/close pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketSpan {
    pub open: usize,
    pub close: usize,
    /// The pair runs from the first to the last non-whitespace character.
    pub is_outer: bool,
}

/// Result of scanning for a bracket pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketScan {
    /// No open bracket of the family at or after the start index.
    NotFound,
    Matched(BracketSpan),
    /// The depth never returned to zero.
    Unmatched { open: usize },
}

impl BracketScan {
    pub fn span(self) -> Option<BracketSpan> {
        match self {
            BracketScan::Matched(span) => Some(span),
            _ => None,
        }
    }

    /// Open and close offsets, `(-1, -1)` when nothing matched.
    pub fn indices(self) -> (isize, isize) {
        match self {
            BracketScan::Matched(span) => (span.open as isize, span.close as isize),
            _ => (-1, -1),
        }
    }
}

/// Find the first open bracket of `pair` at or after byte `start` and its
/// matching close, skipping brackets inside string literals.
pub fn find_matching_bracket(text: &str, pair: BracketPair, start: usize) -> BracketScan {
    let mut open_at = None;
    let mut depth = 0usize;

    for (i, c) in unquoted(text) {
        if i < start {
            continue;
        }
        if c == pair.open() {
            if open_at.is_none() {
                open_at = Some(i);
            }
            depth += 1;
        } else if c == pair.close() {
            let Some(open) = open_at else {
                continue;
            };
            depth -= 1;
            if depth == 0 {
                return BracketScan::Matched(BracketSpan {
                    open,
                    close: i,
                    is_outer: spans_whole(text, open, i),
                });
            }
        }
    }

    match open_at {
        Some(open) => BracketScan::Unmatched { open },
        None => BracketScan::NotFound,
    }
}

fn spans_whole(text: &str, open: usize, close: usize) -> bool {
    let first = text.find(|c: char| !c.is_whitespace());
    let last = text.rfind(|c: char| !c.is_whitespace());
    first == Some(open) && last == Some(close)
}

/// Verify that all three bracket families nest correctly outside literals.
pub fn check_bracket_balance(text: &str) -> Result<(), ParseError> {
    let mut stack: Vec<BracketPair> = Vec::new();
    for (_, c) in unquoted(text) {
        if let Some(pair) = BracketPair::from_open(c) {
            stack.push(pair);
        } else if let Some(pair) = BracketPair::from_close(c) {
            match stack.pop() {
                Some(open) if open == pair => {}
                _ => return Err(ParseError::new(ParseErrorKind::UnbalancedBracket, text)),
            }
        }
    }
    if stack.is_empty() {
        Ok(())
    } else {
        Err(ParseError::new(ParseErrorKind::UnmatchedBracket, text))
    }
}

/// Whether the bracketed fragment is an array subscript such as `v(3)` or
/// `A(i,j)` rather than a grouping such as `(a+b)`.
///
/// The contents must be one or two comma-separated integers or identifiers.
/// With `require_single_char` each index must also be a single character.
pub fn is_bracket_part_of_array(
    fragment: &str,
    pairs: &[BracketPair],
    require_single_char: bool,
) -> bool {
    let fragment = fragment.trim();
    let Some((open, pair)) = unquoted(fragment)
        .find_map(|(i, c)| pairs.iter().find(|p| p.open() == c).map(|p| (i, *p)))
    else {
        return false;
    };
    let Some(span) = find_matching_bracket(fragment, pair, open).span() else {
        return false;
    };
    if span.close + 1 != fragment.len() {
        return false;
    }

    let prefix = &fragment[..open];
    if !prefix.is_empty() && !prefix.split('.').all(is_identifier) {
        return false;
    }

    let inner = &fragment[open + 1..span.close];
    let indices: Vec<&str> = inner.split(',').map(str::trim).collect();
    if indices.is_empty() || indices.len() > 2 {
        return false;
    }
    indices.iter().all(|index| {
        (is_integer(index) || is_identifier(index))
            && (!require_single_char || index.chars().count() == 1)
    })
}

/// Delete whitespace that sits inside any group of the given families,
/// so that `v( 1 , 2 )` becomes `v(1,2)`.
pub fn remove_spaces_in_brackets(text: &str, pairs: &[BracketPair]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    let mut tracker = LiteralTracker::default();

    for c in text.chars() {
        if tracker.step(c) {
            out.push(c);
            continue;
        }
        if pairs.iter().any(|p| p.open() == c) {
            depth += 1;
        } else if pairs.iter().any(|p| p.close() == c) {
            depth = depth.saturating_sub(1);
        } else if depth > 0 && c.is_whitespace() {
            continue;
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Token shapes
// ---------------------------------------------------------------------------

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub fn is_integer(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}
