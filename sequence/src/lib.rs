pub mod arena;
pub mod command;
pub mod compiler;
pub mod error;
pub mod expression;
pub mod objects;
pub mod sandbox;
pub mod solver;
pub mod util;
pub mod wrapper;

pub use arena::{CommandArena, CommandId};
pub use command::{Command, CommandBody, CommandKind, InitContext, ObjectType};
pub use compiler::{CompiledScript, ScriptCompiler, compile_source};
pub use error::{DiagnosticError, SequenceError};
pub use objects::{ObjectStore, RefObject};
pub use sandbox::{RunOptions, RunReport, Sandbox};
pub use solver::{DryRunSolver, Solver, SolverResult, SolverState};
