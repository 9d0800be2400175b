use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::arena::{CommandArena, CommandId};
use crate::command::{CommandBody, CommandKind, InitContext, ObjectType, SolveMode};
use crate::compiler::CompiledScript;
use crate::error::{DiagnosticError, SequenceError};
use crate::objects::{ObjectStore, SOLVER_TYPES};
use crate::solver::{DryRunSolver, Solver, SolverResult, SolverState};
use crate::util::{
    all_commands, get_command_seq_string, get_matching_end, get_next_command, run_complete_tree,
};

/// Runtime knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Object types that act as solvers for `Optimize`/`Target`.
    pub solver_types: Vec<String>,
    /// Upper bound on passes of any single `While`, `For` or solver loop.
    pub max_loop_iterations: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            solver_types: SOLVER_TYPES.iter().map(|s| s.to_string()).collect(),
            max_loop_iterations: 100_000,
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Results recorded by each solver, by solver name.
    pub solver_results: Vec<(String, Vec<SolverResult>)>,
    pub commands_executed: usize,
    pub warnings: Vec<DiagnosticError>,
}

/// Owns a compiled sequence and runs it: initialize every command, walk the
/// sequence, then tell every command the run is complete.
pub struct Sandbox {
    script: CompiledScript,
    options: RunOptions,
    solvers: BTreeMap<String, Box<dyn Solver>>,
    /// Solvers of the enclosing `Optimize`/`Target` loops, innermost last.
    active_solvers: Vec<String>,
    initialized: bool,
    commands_executed: usize,
    warnings: Vec<DiagnosticError>,
}

impl Sandbox {
    pub fn new(script: CompiledScript, options: RunOptions) -> Self {
        Sandbox {
            script,
            options,
            solvers: BTreeMap::new(),
            active_solvers: Vec::new(),
            initialized: false,
            commands_executed: 0,
            warnings: Vec::new(),
        }
    }

    /// Use `solver` for the object of the same name instead of a dry run.
    pub fn add_solver(&mut self, solver: Box<dyn Solver>) {
        self.solvers.insert(solver.name().to_string(), solver);
    }

    pub fn solver(&self, name: &str) -> Option<&dyn Solver> {
        self.solvers.get(name).map(|s| s.as_ref())
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.script.objects
    }

    pub fn arena(&self) -> &CommandArena {
        &self.script.arena
    }

    pub fn head(&self) -> CommandId {
        self.script.head
    }

    pub fn command_seq_string(&self, show_addr: bool, show_gen_str: bool, indent: &str) -> String {
        get_command_seq_string(
            &self.script.arena,
            self.script.head,
            show_addr,
            show_gen_str,
            indent,
        )
    }

    /// Rename an object in the store and in every command that refers to
    /// it. Returns how many commands changed.
    pub fn rename_object(
        &mut self,
        object_type: ObjectType,
        old: &str,
        new: &str,
    ) -> Result<usize, SequenceError> {
        self.script.objects.rename(old, new)?;
        let mut renamed = 0;
        for id in all_commands(&self.script.arena, self.script.head) {
            if self
                .script
                .arena
                .command_mut(id)?
                .rename_ref_object(object_type, old, new)
            {
                renamed += 1;
            }
        }
        debug!("renamed {} to {} in {} command(s)", old, new, renamed);
        Ok(renamed)
    }

    /// Resolve every command's references. The first failure ends
    /// initialization.
    pub fn initialize(&mut self) -> Result<(), DiagnosticError> {
        for object in self.script.objects.iter() {
            if self.options.solver_types.iter().any(|t| t == object.type_name())
                && !self.solvers.contains_key(object.name())
            {
                self.solvers.insert(
                    object.name().to_string(),
                    Box::new(DryRunSolver::new(object.name())),
                );
            }
        }

        let CompiledScript {
            arena,
            head,
            objects,
            ..
        } = &mut self.script;
        let context = InitContext {
            objects,
            solver_types: &self.options.solver_types,
        };
        let mut failure = None;
        for id in all_commands(arena, *head) {
            if let Err(error) = arena.command_mut(id).and_then(|c| c.initialize(&context)) {
                failure = Some((id, error));
                break;
            }
        }
        if let Some((id, error)) = failure {
            return Err(self.diagnostic(id, error));
        }
        self.initialized = true;
        Ok(())
    }

    /// Run the whole sequence once.
    pub fn execute(&mut self) -> Result<RunReport, DiagnosticError> {
        if !self.initialized {
            self.initialize()?;
        }
        self.commands_executed = 0;
        self.warnings.clear();

        let start = self.script.arena.next(self.script.head);
        let result = self.run_range(start, None);
        self.run_complete_chain();
        result?;

        info!("executed {} command(s)", self.commands_executed);
        Ok(RunReport {
            solver_results: self
                .solvers
                .iter()
                .map(|(name, solver)| (name.clone(), solver.results().to_vec()))
                .collect(),
            commands_executed: self.commands_executed,
            warnings: std::mem::take(&mut self.warnings),
        })
    }

    fn run_complete_chain(&mut self) {
        let mut current = self.script.arena.next(self.script.head);
        while let Some(id) = current {
            run_complete_tree(&mut self.script.arena, id);
            current = self.script.arena.next(id);
        }
    }

    /// Run commands from `start` along `next` until `stop` (exclusive) or
    /// the end of the chain.
    fn run_range(
        &mut self,
        start: Option<CommandId>,
        stop: Option<CommandId>,
    ) -> Result<(), DiagnosticError> {
        let mut current = start;
        while let Some(id) = current {
            if Some(id) == stop {
                break;
            }
            self.run_command(id)?;
            current = get_next_command(&self.script.arena, id).map_err(|e| self.diagnostic(id, e))?;
        }
        Ok(())
    }

    fn run_command(&mut self, id: CommandId) -> Result<(), DiagnosticError> {
        let command = self
            .script
            .arena
            .command(id)
            .map_err(|e| self.diagnostic(id, e))?;
        let kind = command.kind();
        self.commands_executed += 1;

        match kind {
            CommandKind::Assignment => self.run_assignment(id),
            CommandKind::CallFunction => {
                let error = SequenceError::execution(
                    command.type_name(),
                    "function calls are not executed",
                    command.generating_string(),
                );
                warn!("{}", error);
                let warning = match self.script.span(id) {
                    Some(span) => DiagnosticError::warning(error, span, self.script.source_id),
                    None => DiagnosticError {
                        is_warning: true,
                        ..DiagnosticError::from(error)
                    },
                };
                self.warnings.push(warning);
                Ok(())
            }
            CommandKind::Generic => {
                debug!("nothing to do for {}", command.generating_string());
                Ok(())
            }
            CommandKind::BeginScript => {
                let end = get_matching_end(&self.script.arena, id);
                let start = self.script.arena.next(id);
                self.run_range(start, end)
            }
            CommandKind::If => {
                let branch = if self.evaluate_condition(id)? { 0 } else { 1 };
                let start = self.script.arena.child(id, branch);
                self.run_range(start, None)
            }
            CommandKind::While => {
                let mut passes = 0;
                while self.evaluate_condition(id)? {
                    self.count_pass(id, &mut passes)?;
                    let start = self.script.arena.child(id, 0);
                    self.run_range(start, None)?;
                }
                Ok(())
            }
            CommandKind::For => self.run_for(id),
            CommandKind::Optimize | CommandKind::Target => self.run_solver_branch(id),
            CommandKind::Minimize | CommandKind::NonlinearConstraint => self.report_to_solver(id),
            _ => Ok(()),
        }
    }

    fn run_assignment(&mut self, id: CommandId) -> Result<(), DiagnosticError> {
        let CompiledScript { arena, objects, .. } = &mut self.script;
        let result = match arena.command(id).map(|c| (c, c.body())) {
            Ok((command, CommandBody::Assignment(body))) => body
                .execute(objects)
                .map(|value| debug!("{} -> {}", command.generating_string(), value))
                .map_err(|m| {
                    SequenceError::execution(command.type_name(), m, command.generating_string())
                }),
            Ok(_) => Ok(()),
            Err(error) => Err(error),
        };
        result.map_err(|e| self.diagnostic(id, e))
    }

    fn evaluate_condition(&self, id: CommandId) -> Result<bool, DiagnosticError> {
        let command = self
            .script
            .arena
            .command(id)
            .map_err(|e| self.diagnostic(id, e))?;
        let CommandBody::Condition(condition) = command.body() else {
            return Ok(false);
        };
        condition.evaluate(&self.script.objects).map_err(|m| {
            let error =
                SequenceError::execution(command.type_name(), m, command.generating_string());
            self.diagnostic(id, error)
        })
    }

    fn count_pass(&self, id: CommandId, passes: &mut usize) -> Result<(), DiagnosticError> {
        *passes += 1;
        if *passes <= self.options.max_loop_iterations {
            return Ok(());
        }
        let type_name = self
            .script
            .arena
            .get(id)
            .map(|c| c.type_name().to_string())
            .unwrap_or_default();
        Err(self.diagnostic(
            id,
            SequenceError::LoopLimit {
                type_name,
                limit: self.options.max_loop_iterations,
            },
        ))
    }

    fn run_for(&mut self, id: CommandId) -> Result<(), DiagnosticError> {
        let command = self
            .script
            .arena
            .command(id)
            .map_err(|e| self.diagnostic(id, e))?;
        let CommandBody::ForLoop(for_loop) = command.body() else {
            return Ok(());
        };
        let for_loop = for_loop.clone();
        let type_name = command.type_name().to_string();
        let generating_string = command.generating_string().to_string();
        let fail = |message: String| {
            let error = SequenceError::execution(&type_name, message, &generating_string);
            self.diagnostic(id, error)
        };
        let (start, step, end) = for_loop.bounds(&self.script.objects).map_err(fail)?;

        let mut passes = 0;
        let mut value = start;
        while (step > 0.0 && value <= end) || (step < 0.0 && value >= end) {
            self.count_pass(id, &mut passes)?;
            if let Err(message) = for_loop.index().assign(&mut self.script.objects, value) {
                let error = SequenceError::execution(&type_name, message, &generating_string);
                return Err(self.diagnostic(id, error));
            }
            let body = self.script.arena.child(id, 0);
            self.run_range(body, None)?;
            value += step;
        }
        Ok(())
    }

    fn run_solver_branch(&mut self, id: CommandId) -> Result<(), DiagnosticError> {
        let command = self
            .script
            .arena
            .command(id)
            .map_err(|e| self.diagnostic(id, e))?;
        let CommandBody::SolverBranch(branch) = command.body() else {
            return Ok(());
        };
        let type_name = command.type_name().to_string();
        let name = branch.solver().to_string();
        let mode = branch.solve_mode();
        let missing = SequenceError::unresolved(
            command.type_name(),
            format!("no solver named \"{}\"", name),
            command.generating_string(),
        );

        let Some(config) = self.script.objects.get(&name).cloned() else {
            return Err(self.diagnostic(id, missing));
        };
        let Some(solver) = self.solvers.get_mut(&name) else {
            return Err(self.diagnostic(id, missing));
        };
        solver.start_run(&config);
        debug!("{} running {} in {} mode", type_name, name, mode);

        self.active_solvers.push(name.clone());
        let result = self.solve(id, &name, mode);
        self.active_solvers.pop();
        run_complete_tree(&mut self.script.arena, id);
        result
    }

    fn solve(&mut self, id: CommandId, name: &str, mode: SolveMode) -> Result<(), DiagnosticError> {
        let mut passes = 0;
        loop {
            self.count_pass(id, &mut passes)?;
            let body = self.script.arena.child(id, 0);
            self.run_range(body, None)?;
            if mode == SolveMode::RunInitialGuess {
                return Ok(());
            }
            let state = match self.solvers.get_mut(name) {
                Some(solver) => solver.advance(),
                None => SolverState::Finished,
            };
            if state == SolverState::Finished {
                return Ok(());
            }
        }
    }

    fn report_to_solver(&mut self, id: CommandId) -> Result<(), DiagnosticError> {
        let CompiledScript { arena, objects, .. } = &mut self.script;
        let active = self.active_solvers.last();
        let solver = active.and_then(|name| self.solvers.get_mut(name));

        let result = arena.command_mut(id).and_then(|command| {
            let type_name = command.type_name().to_string();
            let generating_string = command.generating_string().to_string();
            let Some(solver) = solver else {
                return Err(SequenceError::execution(
                    type_name,
                    "not inside an Optimize or Target loop",
                    generating_string,
                ));
            };
            let outcome = match command.body_mut() {
                CommandBody::Minimize(body) => body.execute(objects, solver.as_mut()),
                CommandBody::NonlinearConstraint(body) => body.execute(objects, solver.as_mut()),
                _ => Ok(()),
            };
            outcome.map_err(|m| SequenceError::execution(type_name, m, generating_string))
        });
        result.map_err(|e| self.diagnostic(id, e))
    }

    fn diagnostic(&self, id: CommandId, error: SequenceError) -> DiagnosticError {
        match self.script.span(id) {
            Some(span) => DiagnosticError::at(error, span, self.script.source_id),
            None => DiagnosticError::from(error),
        }
    }
}
