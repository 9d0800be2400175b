use log::trace;

use crate::block::{BlockType, Statement};
use crate::brackets::{
    BracketPair, BracketScan, check_bracket_balance, find_matching_bracket,
    is_bracket_part_of_array, remove_spaces_in_brackets, unquoted,
};
use crate::parser::error::{ParseError, ParseErrorKind};
use crate::registry::CommandRegistry;

/// Prefix marking a line that sets a field on a remote object.
const REMOTE_KEYWORD: &str = "GMAT";

/// Line-level parser for mission script.
///
/// `evaluate_block` classifies one logical block and caches its pieces;
/// `chunk_line` then decomposes the cached instruction according to the
/// block type. The remaining methods are the splitting primitives the
/// command implementations reuse for their own argument grammars.
#[derive(Debug, Clone)]
pub struct TextParser {
    registry: CommandRegistry,
    block_type: BlockType,
    preface_comment: String,
    inline_comment: String,
    instruction: String,
    is_function_call: bool,
    chunks: Vec<String>,
}

impl TextParser {
    pub fn new(registry: CommandRegistry) -> Self {
        TextParser {
            registry,
            block_type: BlockType::Comment,
            preface_comment: String::new(),
            inline_comment: String::new(),
            instruction: String::new(),
            is_function_call: false,
            chunks: Vec::new(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn preface_comment(&self) -> &str {
        &self.preface_comment
    }

    pub fn inline_comment(&self) -> &str {
        &self.inline_comment
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn is_function_call(&self) -> bool {
        self.is_function_call
    }

    /// `[prefaceComment, inlineComment, instruction]` from the last
    /// `evaluate_block` call.
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    pub fn is_command(&self, token: &str) -> bool {
        self.registry.contains(token)
    }

    fn reset(&mut self) {
        self.block_type = BlockType::Comment;
        self.preface_comment.clear();
        self.inline_comment.clear();
        self.instruction.clear();
        self.is_function_call = false;
        self.chunks.clear();
    }

    // -----------------------------------------------------------------------
    // Block level
    // -----------------------------------------------------------------------

    /// Split a logical block into raw lines, each keeping its terminator.
    pub fn decompose_block(&self, logical_block: &str) -> Vec<String> {
        let bytes = logical_block.as_bytes();
        let mut lines = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < bytes.len() {
            let end = match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => i + 2,
                b'\r' | b'\n' => i + 1,
                _ => {
                    i += 1;
                    continue;
                }
            };
            lines.push(logical_block[start..end].to_string());
            start = end;
            i = end;
        }
        if start < bytes.len() || lines.is_empty() {
            lines.push(logical_block[start..].to_string());
        }
        lines
    }

    /// Classify a logical block, caching its comments and instruction.
    pub fn evaluate_block(&mut self, logical_block: &str) -> Result<BlockType, ParseError> {
        self.reset();

        let lines = self.decompose_block(logical_block);
        if lines.iter().all(|line| line.trim().is_empty()) {
            return Err(ParseError::new(ParseErrorKind::EmptyBlock, logical_block));
        }

        for line in &lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                self.preface_comment.push_str(line);
                continue;
            }

            let (code, comment) = split_inline_comment(strip_remote_keyword(line));
            let instruction = code.trim().trim_end_matches(';').trim_end();
            if instruction.is_empty() {
                self.preface_comment.push_str(line);
                continue;
            }

            self.inline_comment = comment.trim_end().to_string();
            self.instruction = instruction.to_string();
            let (block_type, is_function_call) = self.classify(instruction);
            self.block_type = block_type;
            self.is_function_call = is_function_call;
            break;
        }

        self.chunks = vec![
            self.preface_comment.clone(),
            self.inline_comment.clone(),
            self.instruction.clone(),
        ];
        trace!(
            "evaluated {} block{}: {:?}",
            self.block_type,
            if self.is_function_call { " (function call)" } else { "" },
            self.instruction
        );
        Ok(self.block_type)
    }

    fn classify(&self, instruction: &str) -> (BlockType, bool) {
        let keyword_len = instruction
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(instruction.len());
        let keyword = &instruction[..keyword_len];
        let rest = &instruction[keyword_len..];
        let keyword_ends = rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '(');

        if keyword == "function" && (keyword_ends || rest.starts_with('[')) {
            return (BlockType::Function, false);
        }
        if keyword == "Create" && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
            return (BlockType::Definition, false);
        }
        if keyword_ends && self.is_command(keyword) {
            return (BlockType::Command, false);
        }

        match find_assignment_operator(instruction) {
            Some(eq) if has_unparenthesized_square(&instruction[..eq]) => (BlockType::Command, true),
            Some(_) => (BlockType::Assignment, false),
            None if has_top_level_operator(instruction) => (BlockType::Assignment, false),
            None => (BlockType::Command, true),
        }
    }

    /// Decompose the cached instruction according to the cached block type.
    pub fn chunk_line(&self) -> Result<Vec<String>, ParseError> {
        match self.block_type {
            BlockType::Comment => Ok(Vec::new()),
            BlockType::Definition => self.chunk_definition(),
            BlockType::Command if self.is_function_call => self.chunk_assignment(true),
            BlockType::Command => self.chunk_command(),
            BlockType::Assignment => self.chunk_assignment(false),
            BlockType::Function => self.chunk_function(),
        }
    }

    fn line_error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.instruction.clone()).with_block_type(self.block_type)
    }

    fn chunk_definition(&self) -> Result<Vec<String>, ParseError> {
        let rest = self
            .instruction
            .strip_prefix("Create")
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            .ok_or_else(|| self.line_error(ParseErrorKind::CreateKeywordMissing))?
            .trim_start();

        let type_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let object_type = &rest[..type_end];
        if object_type.is_empty() {
            return Err(self.line_error(ParseErrorKind::ObjectTypeMissing));
        }
        let names = rest[type_end..].trim();
        if names.is_empty() {
            return Err(self.line_error(ParseErrorKind::ObjectNameMissing));
        }
        Ok(vec!["Create".to_string(), object_type.to_string(), names.to_string()])
    }

    fn chunk_command(&self) -> Result<Vec<String>, ParseError> {
        let instruction = self.instruction.trim();
        let name_end = instruction
            .find(|c: char| c.is_whitespace() || c == '(')
            .unwrap_or(instruction.len());
        let name = &instruction[..name_end];
        if name.is_empty() {
            return Err(self.line_error(ParseErrorKind::CommandNameMissing));
        }
        let arguments = instruction[name_end..].trim();
        if arguments.is_empty() {
            Ok(vec![name.to_string()])
        } else {
            Ok(vec![name.to_string(), arguments.to_string()])
        }
    }

    fn chunk_assignment(&self, function_call: bool) -> Result<Vec<String>, ParseError> {
        let instruction = self.instruction.as_str();
        let Some(eq) = find_assignment_operator(instruction) else {
            if function_call {
                return Ok(vec![String::new(), instruction.trim().to_string()]);
            }
            return Err(self.line_error(ParseErrorKind::NoAssignment));
        };

        let lhs = instruction[..eq].trim();
        let rhs = instruction[eq + 1..].trim();
        if lhs.is_empty() {
            return Err(self.line_error(ParseErrorKind::LhsMissing));
        }
        if rhs.is_empty() {
            return Err(self.line_error(ParseErrorKind::RhsMissing));
        }
        Ok(vec![lhs.to_string(), rhs.to_string()])
    }

    fn chunk_function(&self) -> Result<Vec<String>, ParseError> {
        let rest = self
            .instruction
            .strip_prefix("function")
            .unwrap_or(&self.instruction)
            .trim();

        let (outputs, signature) = match find_assignment_operator(rest) {
            Some(eq) => (rest[..eq].trim(), rest[eq + 1..].trim()),
            None => ("", rest),
        };
        if outputs.starts_with('[') {
            check_bracket_balance(outputs).map_err(|e| e.with_block_type(self.block_type))?;
        }

        let name_end = signature.find('(').unwrap_or(signature.len());
        let name = signature[..name_end].trim();
        if name.is_empty() {
            return Err(self.line_error(ParseErrorKind::FunctionNameMissing));
        }
        let inputs = signature[name_end..].trim();
        if !inputs.is_empty() {
            match find_matching_bracket(inputs, BracketPair::Paren, 0) {
                BracketScan::Matched(span) if span.is_outer => {}
                _ => return Err(self.line_error(ParseErrorKind::UnmatchedBracket)),
            }
        }

        Ok(vec![
            "function".to_string(),
            outputs.to_string(),
            name.to_string(),
            inputs.to_string(),
        ])
    }

    /// Classify and decompose one logical block into a statement.
    pub fn parse_statement(&mut self, logical_block: &str) -> Result<Statement, ParseError> {
        let block_type = self.evaluate_block(logical_block)?;
        let chunks = self.chunk_line()?;
        Ok(Statement {
            block_type,
            preface_comment: self.preface_comment.clone(),
            inline_comment: self.inline_comment.clone(),
            instruction: self.instruction.clone(),
            is_function_call: self.is_function_call,
            chunks,
            span: 0..0,
        })
    }

    // -----------------------------------------------------------------------
    // Splitting primitives
    // -----------------------------------------------------------------------

    /// Split by space and comma, keeping bracketed groups of `pair` intact.
    ///
    /// With `check_for_array`, whitespace inside `()`/`[]` groups is removed
    /// first and a group that reads as an array subscript stays glued to the
    /// name before it (`v(1,2)`); any other group becomes its own token.
    /// A trailing `{...}` option block is split off at the last comma before
    /// it, giving exactly two tokens.
    pub fn decompose(
        &self,
        chunk: &str,
        pair: BracketPair,
        check_for_array: bool,
        remove_outer_bracket: bool,
    ) -> Result<Vec<String>, ParseError> {
        let mut text = chunk.trim().to_string();
        if check_for_array {
            text = remove_spaces_in_brackets(&text, &[BracketPair::Paren, BracketPair::Square]);
        }
        check_bracket_balance(&text)?;

        if remove_outer_bracket {
            if let Some(span) = find_matching_bracket(&text, pair, 0).span() {
                if span.is_outer {
                    text = text[span.open + 1..span.close].trim().to_string();
                }
            }
        }

        if let Some(parts) = split_trailing_brace(&text) {
            return Ok(parts);
        }

        match find_matching_bracket(&text, pair, 0) {
            BracketScan::Unmatched { .. } => {
                Err(ParseError::new(ParseErrorKind::UnmatchedBracket, text))
            }
            BracketScan::NotFound => Ok(split_at_depth(&text, |c| c.is_whitespace() || c == ',')),
            BracketScan::Matched(_) => split_keeping_groups(&text, pair, check_for_array),
        }
    }

    /// Strip the outer `pair` and split the interior by any character of
    /// `delim`, at bracket depth zero.
    pub fn separate_brackets(
        &self,
        chunk: &str,
        pair: BracketPair,
        delim: &str,
        check_outer_bracket: bool,
    ) -> Result<Vec<String>, ParseError> {
        let text = chunk.trim();
        let inner = match find_matching_bracket(text, pair, 0) {
            BracketScan::Matched(span) if span.is_outer => &text[span.open + 1..span.close],
            BracketScan::Unmatched { .. } => {
                return Err(ParseError::new(ParseErrorKind::UnmatchedBracket, text));
            }
            _ if check_outer_bracket => {
                return Err(ParseError::new(ParseErrorKind::OuterBracketMissing, text)
                    .with_message(format!("expecting outer bracket \"{}\"", pair)));
            }
            _ => text,
        };
        Ok(split_at_depth(inner, |c| is_delimiter(c, delim)))
    }

    /// The trimmed contents of every top-level `pair` group, in order:
    /// `A(1,2)(3)` gives `["1,2", "3"]`.
    pub fn separate_all_brackets(
        &self,
        chunk: &str,
        pair: BracketPair,
    ) -> Result<Vec<String>, ParseError> {
        let mut groups = Vec::new();
        let mut start = 0;
        loop {
            match find_matching_bracket(chunk, pair, start) {
                BracketScan::NotFound => break,
                BracketScan::Unmatched { .. } => {
                    return Err(ParseError::new(ParseErrorKind::UnmatchedBracket, chunk));
                }
                BracketScan::Matched(span) => {
                    groups.push(chunk[span.open + 1..span.close].trim().to_string());
                    start = span.close + 1;
                }
            }
        }
        Ok(groups)
    }

    /// Split on whitespace outside string literals.
    pub fn separate_spaces(&self, chunk: &str) -> Vec<String> {
        split_unquoted(chunk, char::is_whitespace)
    }

    /// Split a dotted name, leaving numbers such as `1.5e3` whole.
    pub fn separate_dots(&self, chunk: &str) -> Vec<String> {
        let text = chunk.trim();
        if text.parse::<f64>().is_ok() {
            return vec![text.to_string()];
        }
        split_unquoted(text, |c| c == '.')
    }

    /// Split on any character of `delim` outside string literals.
    pub fn separate_by(&self, chunk: &str, delim: &str) -> Vec<String> {
        split_unquoted(chunk, |c| is_delimiter(c, delim))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_remote_keyword(line: &str) -> &str {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix(REMOTE_KEYWORD) {
        Some(rest) if rest.starts_with(|c: char| c == ' ' || c == '\t') => rest,
        _ => line,
    }
}

/// Split a line at its first `%` outside string literals.
pub(crate) fn split_inline_comment(line: &str) -> (&str, &str) {
    match unquoted(line).find(|&(_, c)| c == '%') {
        Some((i, _)) => (&line[..i], &line[i..]),
        None => (line, ""),
    }
}

/// Offset of the first top-level `=` that is not part of `==`, `<=`, `>=`,
/// `~=` or `!=`.
pub(crate) fn find_assignment_operator(text: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = unquoted(text).collect();
    let mut depth = 0usize;
    for (n, &(i, c)) in chars.iter().enumerate() {
        if BracketPair::from_open(c).is_some() {
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
        } else if c == '=' && depth == 0 {
            let previous = n.checked_sub(1).map(|p| chars[p].1);
            let next = chars.get(n + 1).map(|&(_, c)| c);
            if !matches!(previous, Some('=' | '<' | '>' | '~' | '!')) && next != Some('=') {
                return Some(i);
            }
        }
    }
    None
}

/// A `[` outside any parenthesis, as in `[a, b] = f(x)`.
fn has_unparenthesized_square(text: &str) -> bool {
    let mut depth = 0usize;
    for (_, c) in unquoted(text) {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '[' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn has_top_level_operator(text: &str) -> bool {
    let mut depth = 0usize;
    for (_, c) in unquoted(text) {
        if BracketPair::from_open(c).is_some() {
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && "+-*/^<>=~&|'".contains(c) {
            return true;
        }
    }
    false
}

fn is_delimiter(c: char, delim: &str) -> bool {
    delim.contains(c) || (delim.contains(' ') && c.is_whitespace())
}

fn push_token(tokens: &mut Vec<String>, piece: &str) {
    let token = piece.trim();
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
}

fn split_unquoted(text: &str, is_delim: impl Fn(char) -> bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, c) in unquoted(text) {
        if is_delim(c) {
            push_token(&mut tokens, &text[start..i]);
            start = i + c.len_utf8();
        }
    }
    push_token(&mut tokens, &text[start..]);
    tokens
}

/// Split on delimiters that sit outside every bracket group.
fn split_at_depth(text: &str, is_delim: impl Fn(char) -> bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    for (i, c) in unquoted(text) {
        if BracketPair::from_open(c).is_some() {
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && is_delim(c) {
            push_token(&mut tokens, &text[start..i]);
            start = i + c.len_utf8();
        }
    }
    push_token(&mut tokens, &text[start..]);
    tokens
}

/// `pre-text, {option block}` with the brace group closing the string.
fn split_trailing_brace(text: &str) -> Option<Vec<String>> {
    let mut depth = 0usize;
    let mut last_comma = None;
    let mut brace_open = None;
    for (i, c) in unquoted(text) {
        match c {
            '{' if depth == 0 => {
                brace_open = Some(i);
                break;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => last_comma = Some(i),
            _ => {}
        }
    }

    let open = brace_open?;
    let span = find_matching_bracket(text, BracketPair::Brace, open).span()?;
    if span.close + 1 != text.trim_end().len() {
        return None;
    }
    let comma = last_comma?;
    let head = text[..comma].trim();
    if head.is_empty() {
        return None;
    }
    Some(vec![head.to_string(), text[comma + 1..].trim().to_string()])
}

/// Split by space and comma at depth zero. A `pair` group that is not an
/// array subscript is cut out as its own token.
fn split_keeping_groups(
    text: &str,
    pair: BracketPair,
    check_for_array: bool,
) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut group_close: Option<usize> = None;

    for (i, c) in unquoted(text) {
        if BracketPair::from_open(c).is_some() {
            if depth == 0 && c == pair.open() {
                let span = find_matching_bracket(text, pair, i)
                    .span()
                    .ok_or_else(|| ParseError::new(ParseErrorKind::UnmatchedBracket, text))?;
                let fragment = &text[start..=span.close];
                let atomic = check_for_array && is_bracket_part_of_array(fragment, &[pair], false);
                if !atomic {
                    push_token(&mut tokens, &text[start..i]);
                    start = i;
                    group_close = Some(span.close);
                }
            }
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
            if group_close == Some(i) {
                push_token(&mut tokens, &text[start..=i]);
                start = i + 1;
                group_close = None;
            }
        } else if depth == 0 && (c.is_whitespace() || c == ',') {
            push_token(&mut tokens, &text[start..i]);
            start = i + c.len_utf8();
        }
    }
    push_token(&mut tokens, &text[start..]);
    Ok(tokens)
}
