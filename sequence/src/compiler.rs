use std::collections::HashMap;
use std::ops::Range;

use log::{debug, warn};

use script::brackets::{BracketPair, is_identifier, is_integer};
use script::{BlockType, CommandRegistry, Script, Statement, TextParser};

use crate::arena::{CommandArena, CommandId};
use crate::command::{Command, CommandKind};
use crate::error::{DiagnosticError, SequenceError};
use crate::expression::Expression;
use crate::objects::{ARRAY_TYPE, ObjectStore, RefObject};
use crate::wrapper::ElementWrapper;

/// A script turned into a linked command sequence plus the objects its
/// `Create` lines defined.
#[derive(Debug)]
pub struct CompiledScript {
    pub arena: CommandArena,
    /// The `NoOp` sentinel in front of the mission sequence.
    pub head: CommandId,
    pub objects: ObjectStore,
    /// Source span of the statement each command came from.
    pub spans: HashMap<CommandId, Range<usize>>,
    pub source_id: usize,
}

impl CompiledScript {
    pub fn span(&self, id: CommandId) -> Option<Range<usize>> {
        self.spans.get(&id).cloned()
    }
}

/// Blocks still waiting for their terminator.
#[derive(Debug, Clone, Copy)]
enum Frame {
    Branch {
        opener: CommandId,
        kind: CommandKind,
        branch: usize,
    },
    Script {
        opener: CommandId,
    },
    /// An opener that failed to compile. Its error is already reported, so
    /// the frame only absorbs the matching `Else` and terminator.
    Failed {
        kind: CommandKind,
        branch: usize,
    },
}

impl Frame {
    fn opener(self) -> Option<CommandId> {
        match self {
            Frame::Branch { opener, .. } | Frame::Script { opener } => Some(opener),
            Frame::Failed { .. } => None,
        }
    }

    fn terminator(self) -> CommandKind {
        match self {
            Frame::Branch { kind, .. } | Frame::Failed { kind, .. } => {
                kind.info().terminator.unwrap_or(CommandKind::NoOp)
            }
            Frame::Script { .. } => CommandKind::EndScript,
        }
    }
}

/// Links statements into a command sequence, one at a time.
pub struct ScriptCompiler {
    parser: TextParser,
    arena: CommandArena,
    head: CommandId,
    objects: ObjectStore,
    spans: HashMap<CommandId, Range<usize>>,
    frames: Vec<Frame>,
    /// Set by `BeginMissionSequence` or the first command. Assignments
    /// before that configure objects instead of becoming commands.
    in_mission: bool,
    begin_seen: bool,
    source_id: usize,
}

impl ScriptCompiler {
    pub fn new(registry: CommandRegistry, source_id: usize) -> Self {
        let mut arena = CommandArena::new();
        let head = arena.new_sequence();
        ScriptCompiler {
            parser: TextParser::new(registry),
            arena,
            head,
            objects: ObjectStore::new(),
            spans: HashMap::new(),
            frames: Vec::new(),
            in_mission: false,
            begin_seen: false,
            source_id,
        }
    }

    /// Start from objects created elsewhere.
    pub fn with_objects(mut self, objects: ObjectStore) -> Self {
        self.objects = objects;
        self
    }

    /// Compile every statement, collecting one diagnostic per failing
    /// statement, then check that every block was closed.
    pub fn compile(mut self, script: &Script) -> Result<CompiledScript, Vec<DiagnosticError>> {
        let mut errors = Vec::new();
        for statement in &script.statements {
            if let Err(error) = self.add_statement(statement) {
                errors.push(DiagnosticError::at(error, statement.span.clone(), self.source_id));
            }
        }
        errors.extend(self.unclosed_blocks());

        if errors.is_empty() {
            Ok(self.finish())
        } else {
            Err(errors)
        }
    }

    pub fn finish(self) -> CompiledScript {
        CompiledScript {
            arena: self.arena,
            head: self.head,
            objects: self.objects,
            spans: self.spans,
            source_id: self.source_id,
        }
    }

    pub fn add_statement(&mut self, statement: &Statement) -> Result<(), SequenceError> {
        match statement.block_type {
            BlockType::Comment => Ok(()),
            BlockType::Definition => self.define_objects(statement),
            BlockType::Function => Err(SequenceError::invalid_argument(
                "function",
                "function definitions cannot appear in a mission script",
                &statement.instruction,
            )),
            BlockType::Assignment if !self.in_mission => self.configure(statement),
            BlockType::Assignment | BlockType::Command => self.add_command(statement),
        }
    }

    fn define_objects(&mut self, statement: &Statement) -> Result<(), SequenceError> {
        let object_type = statement.chunks.get(1).map(String::as_str).unwrap_or("");
        let names = statement.chunks.get(2).map(String::as_str).unwrap_or("");
        let tokens = self.parser.decompose(names, BracketPair::Square, true, false)?;

        for token in tokens {
            let object = parse_definition(object_type, &token)
                .map_err(|m| SequenceError::invalid_argument("Create", m, &statement.instruction))?;
            debug!("created {} {}", object_type, object.name());
            self.objects.add(object)?;
        }
        Ok(())
    }

    /// `Object.Field = value` before the mission sequence starts.
    fn configure(&mut self, statement: &Statement) -> Result<(), SequenceError> {
        let lhs = statement.chunks.first().map(String::as_str).unwrap_or("");
        let rhs = statement.chunks.get(1).map(String::as_str).unwrap_or("").trim();
        let invalid = |message: String| {
            SequenceError::invalid_argument("Assignment", message, &statement.instruction)
        };

        let target = ElementWrapper::parse(lhs).map_err(invalid)?;
        for name in target.ref_names() {
            if !self.objects.contains(&name) {
                return Err(invalid(format!("undefined object \"{}\"", name)));
            }
        }

        let value = Expression::parse(rhs).and_then(|e| e.evaluate(&self.objects));
        match (value, &target) {
            (Ok(value), _) => target.assign(&mut self.objects, value).map_err(invalid),
            (Err(_), ElementWrapper::ObjectParameter { owner, parameter }) => {
                let text = rhs.trim_matches('\'');
                if let Some(object) = self.objects.get_mut(owner) {
                    object.set_setting(parameter, text);
                }
                Ok(())
            }
            (Err(message), _) => Err(invalid(message)),
        }
    }

    fn add_command(&mut self, statement: &Statement) -> Result<(), SequenceError> {
        let command = match Command::from_statement(statement, &self.parser) {
            Ok(command) => command,
            Err(error) => {
                self.in_mission = true;
                self.open_failed_block(statement);
                return Err(error);
            }
        };
        let kind = command.kind();

        if kind == CommandKind::BeginMissionSequence {
            if self.begin_seen {
                return Err(SequenceError::invalid_argument(
                    command.type_name(),
                    "the mission sequence was already started",
                    command.generating_string(),
                ));
            }
            self.begin_seen = true;
        }
        self.in_mission = true;

        if kind == CommandKind::Else || command.is_block_terminator() {
            self.check_terminator(&command)?;
        }

        let id = self.arena.insert(command);
        self.spans.insert(id, statement.span.clone());
        self.link(id)?;

        match kind {
            CommandKind::BeginScript => self.frames.push(Frame::Script { opener: id }),
            CommandKind::Else => {
                if let Some(Frame::Branch { branch, .. } | Frame::Failed { branch, .. }) =
                    self.frames.last_mut()
                {
                    *branch = 1;
                }
            }
            _ if self.arena.command(id)?.has_children() => self.frames.push(Frame::Branch {
                opener: id,
                kind,
                branch: 0,
            }),
            _ if self.arena.command(id)?.is_block_terminator() => {
                self.frames.pop();
            }
            _ => {}
        }
        Ok(())
    }

    fn open_failed_block(&mut self, statement: &Statement) {
        if statement.block_type != BlockType::Command {
            return;
        }
        let Some(keyword) = statement.chunks.first() else {
            return;
        };
        let kind = CommandKind::from_keyword(keyword);
        if kind.info().terminator.is_some() {
            debug!("{} failed to compile, waiting for {:?}", kind.name(), kind.info().terminator);
            self.frames.push(Frame::Failed { kind, branch: 0 });
        }
    }

    /// A terminator must close the innermost open block; `Else` must sit in
    /// the first branch of an `If`.
    fn check_terminator(&self, command: &Command) -> Result<(), SequenceError> {
        let frame = self.frames.last().copied();
        let accepted = match (command.kind(), frame) {
            (
                CommandKind::Else,
                Some(Frame::Branch { kind, branch, .. } | Frame::Failed { kind, branch }),
            ) => kind == CommandKind::If && branch == 0,
            (terminator, Some(frame)) => frame.terminator() == terminator,
            (_, None) => false,
        };
        if accepted {
            return Ok(());
        }
        Err(SequenceError::UnexpectedTerminator {
            type_name: command.type_name().to_string(),
            expected: frame.map(|f| f.terminator().name().to_string()),
            generating_string: command.generating_string().to_string(),
        })
    }

    /// Append to the innermost open branch, or to the main line.
    fn link(&mut self, id: CommandId) -> Result<(), SequenceError> {
        let target = self.frames.iter().rev().find_map(|frame| match *frame {
            Frame::Branch { opener, branch, .. } => Some((opener, branch)),
            Frame::Script { .. } | Frame::Failed { .. } => None,
        });
        match target {
            Some((opener, branch)) => self.arena.append_to_branch(opener, branch, id),
            None => self.arena.append(self.head, id),
        }
    }

    fn unclosed_blocks(&self) -> Vec<DiagnosticError> {
        self.frames
            .iter()
            .filter_map(|frame| {
                let opener_id = frame.opener()?;
                let opener = self.arena.get(opener_id)?;
                warn!("{} is never closed", opener.type_name());
                let error = SequenceError::UnmatchedBlock {
                    type_name: opener.type_name().to_string(),
                    generating_string: opener.generating_string().to_string(),
                };
                let span = self.spans.get(&opener_id).cloned().unwrap_or(0..0);
                Some(DiagnosticError::at(error, span, self.source_id))
            })
            .collect()
    }
}

fn parse_definition(object_type: &str, token: &str) -> Result<RefObject, String> {
    if object_type == ARRAY_TYPE {
        parse_array_definition(token)
    } else if is_identifier(token) {
        Ok(RefObject::new(object_type, token))
    } else {
        Err(format!("\"{}\" is not a valid object name", token))
    }
}

/// `A[3,3]` or `v[5]`.
fn parse_array_definition(token: &str) -> Result<RefObject, String> {
    let (name, dims) = token
        .split_once('[')
        .and_then(|(name, rest)| Some((name, rest.strip_suffix(']')?)))
        .ok_or_else(|| format!("array \"{}\" needs dimensions, e.g. {}[3,3]", token, token))?;
    if !is_identifier(name) {
        return Err(format!("\"{}\" is not a valid array name", name));
    }
    let dims: Vec<&str> = dims.split(',').map(str::trim).collect();
    let size = |d: &str| -> Result<usize, String> {
        if is_integer(d) {
            d.parse::<usize>().map_err(|e| e.to_string())
        } else {
            Err(format!("invalid array dimension \"{}\"", d))
        }
    };
    match dims.as_slice() {
        [length] => Ok(RefObject::array(name, 1, size(length)?)),
        [rows, columns] => Ok(RefObject::array(name, size(rows)?, size(columns)?)),
        _ => Err(format!("invalid array dimensions in \"{}\"", token)),
    }
}

/// Parse and compile `source` in one step.
pub fn compile_source(
    source: &str,
    source_id: usize,
    registry: &CommandRegistry,
) -> Result<CompiledScript, Vec<DiagnosticError>> {
    let script = Script::parse(source, source_id, registry).map_err(|errors| {
        errors
            .into_iter()
            .map(|e| {
                let span = e.span.clone();
                DiagnosticError::at(SequenceError::Parse(e), span, source_id)
            })
            .collect::<Vec<_>>()
    })?;
    ScriptCompiler::new(registry.clone(), source_id).compile(&script)
}
