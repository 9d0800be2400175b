use std::fmt;
use std::ops::Range;

/// The syntactic category assigned to one logical block of script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Comment,
    /// `Create Type Name ...`
    Definition,
    /// A registered command keyword, or a bare function call.
    Command,
    /// `lhs = rhs`
    Assignment,
    /// `function [out] = Name(in)`
    Function,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockType::Comment => "Comment",
            BlockType::Definition => "Definition",
            BlockType::Command => "Command",
            BlockType::Assignment => "Assignment",
            BlockType::Function => "Function",
        };
        f.write_str(name)
    }
}

/// One classified and decomposed logical block.
#[derive(Debug, Clone)]
pub struct Statement {
    pub block_type: BlockType,
    /// Comment and blank lines preceding the instruction, verbatim.
    pub preface_comment: String,
    /// Trailing `%...` text on the instruction line.
    pub inline_comment: String,
    /// The instruction with comments and the trailing semicolon removed.
    pub instruction: String,
    /// Set when a Command block is really a function call without a keyword.
    pub is_function_call: bool,
    /// Token list whose shape depends on `block_type`:
    /// - Definition: `[Create, objectType, objectNameList]`
    /// - Command: `[commandName]` or `[commandName, arguments]`
    /// - Assignment and function calls: `[lhs, rhs]`
    /// - Function: `[function, outputs, name, inputs]`
    pub chunks: Vec<String>,
    /// Byte span in source for error reporting.
    pub span: Range<usize>,
}

impl Statement {
    /// The command keyword of a Command block that is not a function call.
    pub fn command_name(&self) -> Option<&str> {
        if self.block_type == BlockType::Command && !self.is_function_call {
            self.chunks.first().map(|s| s.as_str())
        } else {
            None
        }
    }

    /// Argument text of a Command block, empty for zero-argument commands.
    pub fn arguments(&self) -> &str {
        self.chunks.get(1).map(|s| s.as_str()).unwrap_or("")
    }
}
