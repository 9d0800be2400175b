use std::fmt;

use log::{debug, trace};

use crate::objects::RefObject;

/// Parameter bounding the number of nominal passes of a solver.
pub const MAX_ITERATIONS_PARAMETER: &str = "MaximumIterations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// The first pass, during which commands register their results.
    Initializing,
    Nominal,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `arg1 <= arg2`
    LessOrEqual,
    /// `arg1 >= arg2`
    GreaterOrEqual,
    /// `arg1 = arg2`
    Equality,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConstraintKind::LessOrEqual => "<=",
            ConstraintKind::GreaterOrEqual => ">=",
            ConstraintKind::Equality => "=",
        })
    }
}

/// What a registered result slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Objective,
    Constraint(ConstraintKind),
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::Objective => f.write_str("objective"),
            ResultKind::Constraint(kind) => write!(f, "constraint ({})", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverResult {
    pub kind: ResultKind,
    pub name: String,
    /// Last reported value.
    pub value: Option<f64>,
    pub reports: usize,
}

/// The collaborator that drives an `Optimize`/`Target` loop and collects
/// the values its body reports.
pub trait Solver {
    fn name(&self) -> &str;

    fn start_run(&mut self, config: &RefObject);

    fn state(&self) -> SolverState;

    /// Reserve a result slot, returning its id. Registering the same name
    /// and kind twice returns the same id.
    fn register_result(&mut self, kind: ResultKind, name: &str) -> usize;

    fn report_result(&mut self, id: usize, value: f64) -> Result<(), String>;

    /// Finish the current pass and decide whether another is needed.
    fn advance(&mut self) -> SolverState;

    fn results(&self) -> &[SolverResult];
}

/// Runs one registration pass followed by `MaximumIterations` nominal
/// passes, recording what the body reports without changing anything.
#[derive(Debug, Clone)]
pub struct DryRunSolver {
    name: String,
    max_iterations: usize,
    pass: usize,
    state: SolverState,
    results: Vec<SolverResult>,
}

impl DryRunSolver {
    pub fn new(name: impl Into<String>) -> Self {
        DryRunSolver {
            name: name.into(),
            max_iterations: 1,
            pass: 0,
            state: SolverState::Initializing,
            results: Vec::new(),
        }
    }

    /// Passes completed in the current run.
    pub fn passes(&self) -> usize {
        self.pass
    }
}

impl Solver for DryRunSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_run(&mut self, config: &RefObject) {
        self.max_iterations = config
            .parameter(MAX_ITERATIONS_PARAMETER)
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(1);
        self.pass = 0;
        self.state = SolverState::Initializing;
        self.results.clear();
        debug!(
            "{} starting dry run with {} nominal pass(es)",
            self.name, self.max_iterations
        );
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn register_result(&mut self, kind: ResultKind, name: &str) -> usize {
        if let Some(id) = self
            .results
            .iter()
            .position(|r| r.kind == kind && r.name == name)
        {
            return id;
        }
        trace!("{} registered {} {}", self.name, kind, name);
        self.results.push(SolverResult {
            kind,
            name: name.to_string(),
            value: None,
            reports: 0,
        });
        self.results.len() - 1
    }

    fn report_result(&mut self, id: usize, value: f64) -> Result<(), String> {
        let result = self
            .results
            .get_mut(id)
            .ok_or_else(|| format!("{} has no result with id {}", self.name, id))?;
        trace!("{} {} = {}", self.name, result.name, value);
        result.value = Some(value);
        result.reports += 1;
        Ok(())
    }

    fn advance(&mut self) -> SolverState {
        self.pass += 1;
        self.state = if self.pass > self.max_iterations {
            SolverState::Finished
        } else {
            SolverState::Nominal
        };
        self.state
    }

    fn results(&self) -> &[SolverResult] {
        &self.results
    }
}
