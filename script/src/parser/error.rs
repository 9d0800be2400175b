use std::fmt;
use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

use crate::block::BlockType;

/// What went wrong while decomposing a line of script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Every line of the logical block was empty.
    EmptyBlock,
    CreateKeywordMissing,
    ObjectTypeMissing,
    ObjectNameMissing,
    CommandNameMissing,
    FunctionNameMissing,
    /// An assignment block without a top-level `=`.
    NoAssignment,
    LhsMissing,
    RhsMissing,
    /// An open bracket whose depth never returns to zero.
    UnmatchedBracket,
    /// Brackets of different families crossing, or a stray close bracket.
    UnbalancedBracket,
    /// A bracket pair spec other than `()`, `[]` or `{}`.
    UnknownBracket,
    /// The chunk was required to be wrapped in an outer bracket pair.
    OuterBracketMissing,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ParseErrorKind::EmptyBlock => "logical block is empty",
            ParseErrorKind::CreateKeywordMissing => "Create keyword missing",
            ParseErrorKind::ObjectTypeMissing => "object type missing",
            ParseErrorKind::ObjectNameMissing => "object name missing",
            ParseErrorKind::CommandNameMissing => "command name missing",
            ParseErrorKind::FunctionNameMissing => "function name missing",
            ParseErrorKind::NoAssignment => "no assignment expression found",
            ParseErrorKind::LhsMissing => "LHS of = missing",
            ParseErrorKind::RhsMissing => "RHS of = missing",
            ParseErrorKind::UnmatchedBracket => "unmatched bracket",
            ParseErrorKind::UnbalancedBracket => "unbalanced bracket",
            ParseErrorKind::UnknownBracket => "unknown bracket character",
            ParseErrorKind::OuterBracketMissing => "expecting outer bracket",
        };
        f.write_str(text)
    }
}

/// Parse errors with source location information.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// The raw text the parser was looking at when it failed.
    pub text: String,
    pub block_type: Option<BlockType>,
    pub span: Range<usize>,
    pub file_id: usize,
    pub severity: Severity,
    pub notes: Vec<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, text: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: kind.to_string(),
            text: text.into(),
            block_type: None,
            span: 0..0,
            file_id: 0,
            severity: Severity::Error,
            notes: Vec::new(),
        }
    }

    /// Replace the default message derived from the kind.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = Some(block_type);
        self
    }

    /// Attach the location of the logical block in its source file.
    pub fn at(mut self, span: Range<usize>, file_id: usize) -> Self {
        self.span = span;
        self.file_id = file_id;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let mut notes = self.notes.clone();
        if !self.text.is_empty() {
            notes.insert(0, format!("while parsing: {}", self.text.trim()));
        }
        Diagnostic::new(self.severity)
            .with_message(self.to_string())
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(notes)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_type {
            Some(block_type) => write!(
                f,
                "{} in {} block \"{}\"",
                self.message,
                block_type,
                self.text.trim()
            ),
            None => write!(f, "{} in \"{}\"", self.message, self.text.trim()),
        }
    }
}

impl std::error::Error for ParseError {}
