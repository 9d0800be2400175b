pub mod block;
pub mod brackets;
pub mod parser;
pub mod registry;
pub mod source;

pub use block::{BlockType, Statement};
pub use brackets::BracketPair;
pub use parser::{ParseError, ParseErrorKind, Parser, TextParser};
pub use registry::CommandRegistry;

/// A parsed mission script.
#[derive(Debug, Clone)]
pub struct Script {
    /// Statements in source order, comment-only blocks included.
    pub statements: Vec<Statement>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Script {
    /// Parse `source` with the given command keywords.
    pub fn parse(
        source: &str,
        source_id: usize,
        registry: &CommandRegistry,
    ) -> Result<Script, Vec<ParseError>> {
        Parser::new(source.to_string(), source_id)
            .with_registry(registry.clone())
            .parse()
    }
}
