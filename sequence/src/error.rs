use std::fmt;
use std::ops::Range;

use script::ParseError;

use crate::arena::CommandId;

/// Failures raised while building, editing, initializing or running a
/// command sequence.
///
/// Structural and resolution variants carry the offending command's type
/// name and generating string so the user can find the line at fault.
#[derive(Debug, Clone)]
pub enum SequenceError {
    /// No `EndScript`/`BranchEnd` closes a block opener.
    UnmatchedBlock {
        type_name: String,
        generating_string: String,
    },
    /// A `BeginScript` about to be removed has no previous command.
    NullPrevious {
        type_name: String,
        generating_string: String,
    },
    /// A branch head whose owning branch command could not be located.
    ParentNotFound {
        type_name: String,
        generating_string: String,
    },
    /// The sentinel head of a sequence can only go with the whole sequence.
    CannotRemoveHead,
    /// The handle refers to a node that has been deleted.
    StaleHandle(CommandId),
    /// A terminator that does not close the innermost open block.
    UnexpectedTerminator {
        type_name: String,
        expected: Option<String>,
        generating_string: String,
    },
    /// A named object that does not exist, or exists with the wrong type.
    UnresolvedReference {
        type_name: String,
        message: String,
        generating_string: String,
    },
    /// A command's own argument grammar was violated.
    InvalidArgument {
        type_name: String,
        message: String,
        generating_string: String,
    },
    /// The command cannot report names for the requested object type.
    UnsupportedObjectType {
        type_name: String,
        object_type: String,
    },
    DuplicateObject(String),
    Execution {
        type_name: String,
        message: String,
        generating_string: String,
    },
    /// A loop ran past the configured iteration bound.
    LoopLimit { type_name: String, limit: usize },
    Parse(ParseError),
}

impl SequenceError {
    pub fn invalid_argument(
        type_name: impl Into<String>,
        message: impl Into<String>,
        generating_string: impl Into<String>,
    ) -> Self {
        SequenceError::InvalidArgument {
            type_name: type_name.into(),
            message: message.into(),
            generating_string: generating_string.into(),
        }
    }

    pub fn unresolved(
        type_name: impl Into<String>,
        message: impl Into<String>,
        generating_string: impl Into<String>,
    ) -> Self {
        SequenceError::UnresolvedReference {
            type_name: type_name.into(),
            message: message.into(),
            generating_string: generating_string.into(),
        }
    }

    pub fn execution(
        type_name: impl Into<String>,
        message: impl Into<String>,
        generating_string: impl Into<String>,
    ) -> Self {
        SequenceError::Execution {
            type_name: type_name.into(),
            message: message.into(),
            generating_string: generating_string.into(),
        }
    }
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::UnmatchedBlock {
                type_name,
                generating_string,
            } => write!(
                f,
                "no matching end found for {} command \"{}\"",
                type_name, generating_string
            ),
            SequenceError::NullPrevious {
                type_name,
                generating_string,
            } => write!(
                f,
                "previous command cannot be null when removing {} command \"{}\"",
                type_name, generating_string
            ),
            SequenceError::ParentNotFound {
                type_name,
                generating_string,
            } => write!(
                f,
                "parent command not found for {} command \"{}\"",
                type_name, generating_string
            ),
            SequenceError::CannotRemoveHead => {
                write!(f, "the first command of a sequence cannot be removed")
            }
            SequenceError::StaleHandle(id) => write!(f, "command {} no longer exists", id),
            SequenceError::UnexpectedTerminator {
                type_name,
                expected: Some(expected),
                generating_string,
            } => write!(
                f,
                "{} found where {} was expected in \"{}\"",
                type_name, expected, generating_string
            ),
            SequenceError::UnexpectedTerminator {
                type_name,
                expected: None,
                generating_string,
            } => write!(
                f,
                "{} has no open block to close in \"{}\"",
                type_name, generating_string
            ),
            SequenceError::UnresolvedReference {
                type_name,
                message,
                generating_string,
            } => write!(
                f,
                "cannot initialize {} command \"{}\": {}",
                type_name, generating_string, message
            ),
            SequenceError::InvalidArgument {
                type_name,
                message,
                generating_string,
            } => write!(
                f,
                "{} in {} command \"{}\"",
                message, type_name, generating_string
            ),
            SequenceError::UnsupportedObjectType {
                type_name,
                object_type,
            } => write!(
                f,
                "{} command has no {} references",
                type_name, object_type
            ),
            SequenceError::DuplicateObject(name) => {
                write!(f, "an object named \"{}\" already exists", name)
            }
            SequenceError::Execution {
                type_name,
                message,
                generating_string,
            } => write!(
                f,
                "{} failed in \"{}\": {}",
                type_name, generating_string, message
            ),
            SequenceError::LoopLimit { type_name, limit } => {
                write!(f, "{} loop exceeded {} iterations", type_name, limit)
            }
            SequenceError::Parse(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for SequenceError {}

impl From<ParseError> for SequenceError {
    fn from(error: ParseError) -> Self {
        SequenceError::Parse(error)
    }
}

/// An error or warning enriched with the location of the statement that
/// produced the failing command.
#[derive(Debug, Clone)]
pub struct DiagnosticError {
    pub error: SequenceError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
    pub is_warning: bool,
}

impl DiagnosticError {
    pub fn at(error: SequenceError, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
            is_warning: false,
        }
    }

    /// Create a warning diagnostic with a source span.
    pub fn warning(error: SequenceError, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
            is_warning: true,
        }
    }
}

impl From<SequenceError> for DiagnosticError {
    fn from(error: SequenceError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
            is_warning: false,
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DiagnosticError {}
