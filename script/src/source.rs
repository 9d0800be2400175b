use std::ops::Range;

use crate::brackets::{BracketPair, unquoted};
use crate::parser::text::split_inline_comment;

/// Trailing marker joining a line with the next one.
const CONTINUATION: &str = "...";

/// One statement's worth of script text, with the comment and blank lines
/// that precede it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalBlock {
    pub text: String,
    /// Byte span in source for error reporting.
    pub span: Range<usize>,
}

/// Split a whole script into logical blocks.
///
/// Comment and blank lines attach to the next statement as its preface.
/// A line whose code ends in `...` continues on the next line. Several
/// statements on one line separated by `;` become separate blocks sharing
/// the line's span. Trailing comments form a final comment-only block.
pub fn logical_blocks(source: &str) -> Vec<LogicalBlock> {
    let mut blocks = Vec::new();
    let mut preface = String::new();
    let mut statement = String::new();
    let mut block_start: Option<usize> = None;
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        block_start.get_or_insert(line_start);

        let trimmed = line.trim();
        if statement.is_empty() && (trimmed.is_empty() || trimmed.starts_with('%')) {
            preface.push_str(line);
            continue;
        }

        let (code, _) = split_inline_comment(line);
        if let Some(head) = code.trim_end().strip_suffix(CONTINUATION) {
            statement.push_str(head);
            statement.push(' ');
            continue;
        }

        statement.push_str(line);
        let span = block_start.take().unwrap_or(line_start)..offset;
        for (n, piece) in split_statements(&statement).into_iter().enumerate() {
            let text = if n == 0 {
                format!("{}{}", preface, piece)
            } else {
                piece
            };
            blocks.push(LogicalBlock {
                text,
                span: span.clone(),
            });
        }
        preface.clear();
        statement.clear();
    }

    let rest = format!("{}{}", preface, statement);
    if !rest.trim().is_empty() {
        blocks.push(LogicalBlock {
            text: rest,
            span: block_start.unwrap_or(offset)..offset,
        });
    }
    blocks
}

/// Cut a statement line at top-level semicolons. The inline comment and
/// line terminator stay with the last piece.
fn split_statements(statement: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;

    for (i, c) in unquoted(statement) {
        if c == '%' {
            break;
        }
        if BracketPair::from_open(c).is_some() {
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
        } else if c == ';' && depth == 0 {
            pieces.push(statement[start..=i].to_string());
            start = i + 1;
        }
    }

    let rest = &statement[start..];
    let (code, _) = split_inline_comment(rest);
    match pieces.last_mut() {
        Some(last) if code.trim().is_empty() => last.push_str(rest),
        _ => pieces.push(rest.to_string()),
    }
    pieces
}
