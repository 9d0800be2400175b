pub mod error;
pub mod text;

pub use error::{ParseError, ParseErrorKind};
pub use text::TextParser;

use crate::Script;
use crate::registry::CommandRegistry;
use crate::source::logical_blocks;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
    registry: CommandRegistry,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser {
            source,
            file_id,
            registry: CommandRegistry::default(),
        }
    }

    /// Use `registry` instead of the built-in command keywords.
    pub fn with_registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Parse the script source into classified statements.
    ///
    /// A statement that fails to parse does not stop the others; every
    /// error is collected and returned together.
    pub fn parse(&self) -> Result<Script, Vec<ParseError>> {
        let mut text_parser = TextParser::new(self.registry.clone());
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        for block in logical_blocks(&self.source) {
            match text_parser.parse_statement(&block.text) {
                Ok(mut statement) => {
                    statement.span = block.span;
                    statements.push(statement);
                }
                Err(error) => errors.push(error.at(block.span, self.file_id)),
            }
        }

        if errors.is_empty() {
            Ok(Script {
                statements,
                source_id: self.file_id,
            })
        } else {
            Err(errors)
        }
    }
}
