pub mod assignment;
pub mod control;
pub mod generic;
pub mod minimize;
pub mod nonlinear_constraint;
pub mod solver_branch;

use std::fmt;

use log::trace;

use script::{BlockType, Statement, TextParser};

use crate::arena::CommandId;
use crate::error::SequenceError;
use crate::objects::ObjectStore;

pub use assignment::{Assignment, CallFunction};
pub use control::{Condition, ForLoop};
pub use generic::Generic;
pub use minimize::{Minimize, ResultState};
pub use nonlinear_constraint::NonlinearConstraint;
pub use solver_branch::{SolveMode, SolverBranch};

// ---------------------------------------------------------------------------
// Kinds and their capabilities
// ---------------------------------------------------------------------------

/// Every command the sequence knows how to link.
///
/// Registered keywords without dedicated behavior compile to `Generic`,
/// which keeps the keyword as its type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    NoOp,
    BeginMissionSequence,
    BeginScript,
    EndScript,
    Assignment,
    CallFunction,
    If,
    Else,
    EndIf,
    While,
    EndWhile,
    For,
    EndFor,
    Optimize,
    EndOptimize,
    Target,
    EndTarget,
    Minimize,
    NonlinearConstraint,
    Generic,
}

/// Static description of a command kind.
#[derive(Debug)]
pub struct KindInfo {
    pub kind: CommandKind,
    pub name: &'static str,
    /// The family answered by `is_of_type` besides the name itself.
    pub class: Option<&'static str>,
    pub has_children: bool,
    pub block_opener: bool,
    pub block_terminator: bool,
    pub branch_end: bool,
    /// For openers, the kind that closes them.
    pub terminator: Option<CommandKind>,
}

const fn plain(kind: CommandKind, name: &'static str) -> KindInfo {
    KindInfo {
        kind,
        name,
        class: None,
        has_children: false,
        block_opener: false,
        block_terminator: false,
        branch_end: false,
        terminator: None,
    }
}

const fn branch(
    kind: CommandKind,
    name: &'static str,
    class: Option<&'static str>,
    terminator: CommandKind,
) -> KindInfo {
    KindInfo {
        kind,
        name,
        class,
        has_children: true,
        block_opener: true,
        block_terminator: false,
        branch_end: false,
        terminator: Some(terminator),
    }
}

const fn branch_end(kind: CommandKind, name: &'static str) -> KindInfo {
    KindInfo {
        kind,
        name,
        class: None,
        has_children: false,
        block_opener: false,
        block_terminator: true,
        branch_end: true,
        terminator: None,
    }
}

/// Indexed by `CommandKind as usize`.
static KIND_TABLE: [KindInfo; 20] = [
    plain(CommandKind::NoOp, "NoOp"),
    plain(CommandKind::BeginMissionSequence, "BeginMissionSequence"),
    KindInfo {
        block_opener: true,
        terminator: Some(CommandKind::EndScript),
        ..plain(CommandKind::BeginScript, "BeginScript")
    },
    KindInfo {
        block_terminator: true,
        ..plain(CommandKind::EndScript, "EndScript")
    },
    plain(CommandKind::Assignment, "Assignment"),
    plain(CommandKind::CallFunction, "CallFunction"),
    branch(CommandKind::If, "If", Some("ConditionalBranch"), CommandKind::EndIf),
    // Else ends the first branch of an If without closing the If.
    KindInfo {
        block_terminator: false,
        ..branch_end(CommandKind::Else, "Else")
    },
    branch_end(CommandKind::EndIf, "EndIf"),
    branch(CommandKind::While, "While", Some("ConditionalBranch"), CommandKind::EndWhile),
    branch_end(CommandKind::EndWhile, "EndWhile"),
    branch(CommandKind::For, "For", None, CommandKind::EndFor),
    branch_end(CommandKind::EndFor, "EndFor"),
    branch(
        CommandKind::Optimize,
        "Optimize",
        Some("SolverBranchCommand"),
        CommandKind::EndOptimize,
    ),
    branch_end(CommandKind::EndOptimize, "EndOptimize"),
    branch(
        CommandKind::Target,
        "Target",
        Some("SolverBranchCommand"),
        CommandKind::EndTarget,
    ),
    branch_end(CommandKind::EndTarget, "EndTarget"),
    plain(CommandKind::Minimize, "Minimize"),
    plain(CommandKind::NonlinearConstraint, "NonlinearConstraint"),
    plain(CommandKind::Generic, "Generic"),
];

impl CommandKind {
    pub fn info(self) -> &'static KindInfo {
        &KIND_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// The kind a registered keyword compiles to.
    pub fn from_keyword(keyword: &str) -> CommandKind {
        KIND_TABLE
            .iter()
            .find(|info| {
                info.name == keyword
                    && !matches!(
                        info.kind,
                        CommandKind::Assignment | CommandKind::CallFunction | CommandKind::Generic
                    )
            })
            .map(|info| info.kind)
            .unwrap_or(CommandKind::Generic)
    }

    pub fn all() -> impl Iterator<Item = CommandKind> {
        KIND_TABLE.iter().map(|info| info.kind)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Object categories a command can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Any,
    Spacecraft,
    Parameter,
    Solver,
    Hardware,
    Function,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectType::Any => "object",
            ObjectType::Spacecraft => "Spacecraft",
            ObjectType::Parameter => "Parameter",
            ObjectType::Solver => "Solver",
            ObjectType::Hardware => "Hardware",
            ObjectType::Function => "Function",
        })
    }
}

/// What a command may look at while resolving its references.
pub struct InitContext<'a> {
    pub objects: &'a ObjectStore,
    /// Object types that count as solvers.
    pub solver_types: &'a [String],
}

impl InitContext<'_> {
    pub fn is_solver(&self, name: &str) -> bool {
        self.objects
            .get(name)
            .is_some_and(|object| self.solver_types.iter().any(|t| t == object.type_name()))
    }
}

// ---------------------------------------------------------------------------
// Command node
// ---------------------------------------------------------------------------

/// Per-kind state.
#[derive(Debug, Clone)]
pub enum CommandBody {
    Structural,
    Assignment(Assignment),
    CallFunction(CallFunction),
    Condition(Condition),
    ForLoop(ForLoop),
    SolverBranch(SolverBranch),
    Minimize(Minimize),
    NonlinearConstraint(NonlinearConstraint),
    Generic(Generic),
}

/// One node of a command sequence.
#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandKind,
    type_name: String,
    /// The quoted label some commands carry, e.g. `Target 'Hohmann' DC1`.
    label: Option<String>,
    pub(crate) previous: Option<CommandId>,
    pub(crate) next: Option<CommandId>,
    pub(crate) children: Vec<Option<CommandId>>,
    generating_string: String,
    body: CommandBody,
}

impl Command {
    /// A command with no arguments, e.g. `EndIf;`.
    pub fn new(kind: CommandKind) -> Self {
        let generating_string = match kind {
            CommandKind::NoOp => String::new(),
            _ => format!("{};", kind.name()),
        };
        Command::with_body(kind, kind.name(), generating_string, CommandBody::Structural)
    }

    pub fn with_body(
        kind: CommandKind,
        type_name: impl Into<String>,
        generating_string: impl Into<String>,
        body: CommandBody,
    ) -> Self {
        Command {
            kind,
            type_name: type_name.into(),
            label: None,
            previous: None,
            next: None,
            children: if kind.info().has_children {
                vec![None]
            } else {
                Vec::new()
            },
            generating_string: generating_string.into(),
            body,
        }
    }

    /// Parse one logical block and build the command it describes.
    pub fn from_line(line: &str, parser: &mut TextParser) -> Result<Command, SequenceError> {
        let statement = parser.parse_statement(line)?;
        Command::from_statement(&statement, parser)
    }

    /// Build the command for a Command or Assignment statement.
    pub fn from_statement(
        statement: &Statement,
        parser: &TextParser,
    ) -> Result<Command, SequenceError> {
        let generating_string = format!("{};", statement.instruction);
        let chunk = |i: usize| statement.chunks.get(i).map(|s| s.as_str()).unwrap_or("");

        match statement.block_type {
            BlockType::Assignment => {
                let body = Assignment::parse(chunk(0), chunk(1))
                    .map_err(|m| SequenceError::invalid_argument("Assignment", m, &generating_string))?;
                return Ok(Command::with_body(
                    CommandKind::Assignment,
                    "Assignment",
                    generating_string,
                    CommandBody::Assignment(body),
                ));
            }
            BlockType::Command if statement.is_function_call => {
                let body = CallFunction::parse(chunk(0), chunk(1), parser).map_err(|m| {
                    SequenceError::invalid_argument("CallFunction", m, &generating_string)
                })?;
                return Ok(Command::with_body(
                    CommandKind::CallFunction,
                    "CallFunction",
                    generating_string,
                    CommandBody::CallFunction(body),
                ));
            }
            BlockType::Command => {}
            other => {
                return Err(SequenceError::invalid_argument(
                    other.to_string(),
                    "not a command",
                    generating_string,
                ));
            }
        }

        let keyword = chunk(0);
        let kind = CommandKind::from_keyword(keyword);
        let (label, arguments) = split_label(statement.arguments());
        let invalid = |message: String| {
            SequenceError::invalid_argument(keyword, message, &generating_string)
        };

        let body = match kind {
            CommandKind::If | CommandKind::While => {
                CommandBody::Condition(Condition::parse(arguments).map_err(invalid)?)
            }
            CommandKind::For => CommandBody::ForLoop(ForLoop::parse(arguments).map_err(invalid)?),
            CommandKind::Optimize | CommandKind::Target => {
                CommandBody::SolverBranch(SolverBranch::parse(arguments, parser).map_err(invalid)?)
            }
            CommandKind::Minimize => {
                CommandBody::Minimize(Minimize::parse(arguments, parser).map_err(invalid)?)
            }
            CommandKind::NonlinearConstraint => CommandBody::NonlinearConstraint(
                NonlinearConstraint::parse(arguments, parser).map_err(invalid)?,
            ),
            CommandKind::Generic => CommandBody::Generic(Generic::new(arguments)),
            _ if arguments.is_empty() => CommandBody::Structural,
            _ => {
                return Err(invalid(format!("unexpected arguments \"{}\"", arguments)));
            }
        };

        let mut command = Command::with_body(kind, keyword, generating_string, body);
        command.label = label;
        trace!("built {} from {:?}", command.type_name, statement.instruction);
        Ok(command)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn previous(&self) -> Option<CommandId> {
        self.previous
    }

    pub fn next(&self) -> Option<CommandId> {
        self.next
    }

    pub fn children(&self) -> &[Option<CommandId>] {
        &self.children
    }

    /// Head of branch `index`, if that branch exists and is not empty.
    pub fn child_command(&self, index: usize) -> Option<CommandId> {
        self.children.get(index).copied().flatten()
    }

    pub fn branch_count(&self) -> usize {
        self.children.len()
    }

    pub fn generating_string(&self) -> &str {
        &self.generating_string
    }

    pub fn body(&self) -> &CommandBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut CommandBody {
        &mut self.body
    }

    pub fn has_children(&self) -> bool {
        self.kind.info().has_children
    }

    pub fn is_block_opener(&self) -> bool {
        self.kind.info().block_opener
    }

    pub fn is_block_terminator(&self) -> bool {
        self.kind.info().block_terminator
    }

    /// Whether the command answers to `name`: its own type name, its kind,
    /// its family (`BranchCommand`, `BranchEnd`, `ConditionalBranch`,
    /// `SolverBranchCommand`) or `GmatCommand`.
    pub fn is_of_type(&self, name: &str) -> bool {
        let info = self.kind.info();
        name == self.type_name
            || name == info.name
            || name == "GmatCommand"
            || (name == "BranchCommand" && info.has_children)
            || (name == "BranchEnd" && info.branch_end)
            || info.class == Some(name)
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    /// Names of the objects of `object_type` this command refers to.
    ///
    /// Commands whose grammar cannot contain that kind of object return
    /// `UnsupportedObjectType`.
    pub fn ref_object_names(&self, object_type: ObjectType) -> Result<Vec<String>, SequenceError> {
        let names = match &self.body {
            CommandBody::Structural => Some(Vec::new()),
            CommandBody::Assignment(body) => body.ref_object_names(object_type),
            CommandBody::CallFunction(body) => body.ref_object_names(object_type),
            CommandBody::Condition(body) => body.ref_object_names(object_type),
            CommandBody::ForLoop(body) => body.ref_object_names(object_type),
            CommandBody::SolverBranch(body) => Some(body.ref_object_names(object_type)),
            CommandBody::Minimize(body) => Some(body.ref_object_names(object_type)),
            CommandBody::NonlinearConstraint(body) => Some(body.ref_object_names(object_type)),
            CommandBody::Generic(body) => Some(body.ref_object_names(object_type)),
        };
        names.ok_or_else(|| SequenceError::UnsupportedObjectType {
            type_name: self.type_name.clone(),
            object_type: object_type.to_string(),
        })
    }

    /// Rename references to `old` in the command's arguments and generating
    /// string. Returns whether anything changed.
    pub fn rename_ref_object(&mut self, object_type: ObjectType, old: &str, new: &str) -> bool {
        let renamed = match &mut self.body {
            CommandBody::Structural => false,
            CommandBody::Assignment(body) => body.rename(old, new),
            CommandBody::CallFunction(body) => body.rename(object_type, old, new),
            CommandBody::Condition(body) => body.rename(old, new),
            CommandBody::ForLoop(body) => body.rename(old, new),
            CommandBody::SolverBranch(body) => body.rename(old, new),
            CommandBody::Minimize(body) => body.rename(object_type, old, new),
            CommandBody::NonlinearConstraint(body) => body.rename(object_type, old, new),
            CommandBody::Generic(body) => body.rename(old, new),
        };
        if renamed {
            self.generating_string = replace_whole_word(&self.generating_string, old, new);
        }
        renamed
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Resolve every referenced object. Failure is fatal for the run.
    pub fn initialize(&mut self, context: &InitContext<'_>) -> Result<(), SequenceError> {
        let result = match &mut self.body {
            CommandBody::Structural | CommandBody::CallFunction(_) | CommandBody::Generic(_) => {
                Ok(())
            }
            CommandBody::Assignment(body) => body.initialize(context.objects),
            CommandBody::Condition(body) => body.initialize(context.objects),
            CommandBody::ForLoop(body) => body.initialize(context.objects),
            CommandBody::SolverBranch(body) => body.initialize(context),
            CommandBody::Minimize(body) => body.initialize(context),
            CommandBody::NonlinearConstraint(body) => body.initialize(context),
        };
        result.map_err(|message| {
            SequenceError::unresolved(&self.type_name, message, &self.generating_string)
        })
    }

    /// Reset per-run state once the enclosing run or solver loop is done.
    pub fn run_complete(&mut self) {
        match &mut self.body {
            CommandBody::Minimize(body) => body.run_complete(),
            CommandBody::NonlinearConstraint(body) => body.run_complete(),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split a leading `'quoted label'` off a command's arguments.
pub(crate) fn split_label(arguments: &str) -> (Option<String>, &str) {
    let arguments = arguments.trim();
    let Some(rest) = arguments.strip_prefix('\'') else {
        return (None, arguments);
    };
    match rest.find('\'') {
        Some(end) => (Some(rest[..end].to_string()), rest[end + 1..].trim()),
        None => (None, arguments),
    }
}

/// Replace whole-word occurrences of `old`. A word preceded by `.` is a
/// field name, not an object, and is left alone.
pub fn replace_whole_word(text: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return text.to_string();
    }
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(text.len());
    let mut start = 0;

    while let Some(found) = text[start..].find(old) {
        let pos = start + found;
        let end = pos + old.len();
        let before = text[..pos].chars().next_back();
        let after = text[end..].chars().next();
        out.push_str(&text[start..pos]);
        if before.is_some_and(|c| is_word(c) || c == '.') || after.is_some_and(is_word) {
            out.push_str(old);
        } else {
            out.push_str(new);
        }
        start = end;
    }
    out.push_str(&text[start..]);
    out
}

/// Identifiers in free-form argument text, owner part only for dotted
/// names, in order of first appearance.
pub(crate) fn referenced_identifiers(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut literal = script::brackets::LiteralTracker::default();
    let mut word = String::new();
    let mut after_dot = false;

    fn flush(word: &mut String, after_dot: bool, names: &mut Vec<String>) {
        if !word.is_empty()
            && !after_dot
            && script::brackets::is_identifier(word)
            && !names.contains(word)
        {
            names.push(word.clone());
        }
        word.clear();
    }

    for c in text.chars() {
        if literal.step(c) {
            flush(&mut word, after_dot, &mut names);
            after_dot = false;
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush(&mut word, after_dot, &mut names);
        after_dot = c == '.';
    }
    flush(&mut word, after_dot, &mut names);
    names
}

/// Fail with the first name that is not in the store.
pub(crate) fn require_objects<'a>(
    objects: &ObjectStore,
    names: impl IntoIterator<Item = &'a String>,
) -> Result<(), String> {
    for name in names {
        if !objects.contains(name) {
            return Err(format!("undefined object \"{}\"", name));
        }
    }
    Ok(())
}
