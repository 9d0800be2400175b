use script::brackets::{check_bracket_balance, is_identifier};
use script::{BracketPair, TextParser};

use crate::command::{InitContext, ObjectType, require_objects};
use crate::objects::ObjectStore;
use crate::solver::{ResultKind, Solver};
use crate::wrapper::ElementWrapper;

/// Where a result-reporting command stands with its solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultState {
    #[default]
    Unregistered,
    /// The slot exists but nothing has been reported yet.
    Registered(usize),
    Reporting(usize),
}

impl ResultState {
    pub fn id(self) -> Option<usize> {
        match self {
            ResultState::Unregistered => None,
            ResultState::Registered(id) | ResultState::Reporting(id) => Some(id),
        }
    }
}

/// Split `solver(contents)` into the solver name and the single argument
/// between the parentheses. Square brackets and braces are not part of
/// this grammar.
pub(crate) fn split_solver_call(
    arguments: &str,
    parser: &TextParser,
) -> Result<(String, String), String> {
    let arguments = arguments.trim();
    if arguments.contains(['[', ']', '{', '}']) {
        return Err(format!(
            "brackets \"[]{{}}\" are not allowed in \"{}\"",
            arguments
        ));
    }
    check_bracket_balance(arguments).map_err(|e| e.to_string())?;

    let tokens = parser
        .decompose(arguments, BracketPair::Paren, false, false)
        .map_err(|e| e.to_string())?;
    let [solver, group] = tokens.as_slice() else {
        return Err(format!(
            "expecting \"SolverName(argument)\", got \"{}\"",
            arguments
        ));
    };
    if !is_identifier(solver) {
        return Err(format!("\"{}\" is not a valid solver name", solver));
    }

    let inner = parser
        .separate_brackets(group, BracketPair::Paren, ",", true)
        .map_err(|e| e.to_string())?;
    match inner.as_slice() {
        [argument] => Ok((solver.clone(), argument.clone())),
        [] => Err(format!("missing argument in \"{}\"", arguments)),
        _ => Err(format!("expecting a single argument in \"{}\"", arguments)),
    }
}

pub(crate) fn check_solver(context: &InitContext<'_>, solver: &str) -> Result<(), String> {
    if !context.objects.contains(solver) {
        return Err(format!("solver \"{}\" was not created", solver));
    }
    if !context.is_solver(solver) {
        return Err(format!("\"{}\" is not a solver", solver));
    }
    Ok(())
}

pub(crate) fn check_loop_solver(solver: &dyn Solver, expected: &str) -> Result<(), String> {
    if solver.name() == expected {
        Ok(())
    } else {
        Err(format!(
            "refers to solver \"{}\" but runs inside the \"{}\" loop",
            expected,
            solver.name()
        ))
    }
}

/// `Minimize optimizer(objective)`.
#[derive(Debug, Clone)]
pub struct Minimize {
    optimizer: String,
    objective_name: String,
    objective: ElementWrapper,
    state: ResultState,
}

impl Minimize {
    pub fn parse(arguments: &str, parser: &TextParser) -> Result<Self, String> {
        let (optimizer, objective_name) = split_solver_call(arguments, parser)?;
        let objective = ElementWrapper::parse(&objective_name)?;
        if matches!(objective, ElementWrapper::Number(_)) {
            return Err(format!(
                "objective \"{}\" must be a variable or parameter",
                objective_name
            ));
        }
        Ok(Minimize {
            optimizer,
            objective_name,
            objective,
            state: ResultState::Unregistered,
        })
    }

    pub fn optimizer_name(&self) -> &str {
        &self.optimizer
    }

    pub fn objective_name(&self) -> &str {
        &self.objective_name
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Vec<String> {
        match object_type {
            ObjectType::Solver => vec![self.optimizer.clone()],
            ObjectType::Parameter => self.objective.ref_names(),
            ObjectType::Spacecraft => self.objective.owner().map(str::to_string).into_iter().collect(),
            ObjectType::Any => {
                let mut names = vec![self.optimizer.clone()];
                names.extend(self.objective.ref_names());
                names
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn rename(&mut self, object_type: ObjectType, old: &str, new: &str) -> bool {
        let mut renamed = false;
        if matches!(object_type, ObjectType::Any | ObjectType::Solver) && self.optimizer == old {
            self.optimizer = new.to_string();
            renamed = true;
        }
        if object_type != ObjectType::Solver && self.objective.rename(old, new) {
            self.objective_name = self.objective.to_string();
            renamed = true;
        }
        renamed
    }

    pub(crate) fn initialize(&self, context: &InitContext<'_>) -> Result<(), String> {
        check_solver(context, &self.optimizer)?;
        require_objects(context.objects, &self.objective.ref_names())
    }

    /// Register the objective on the first call, report its value on every
    /// later one.
    pub fn execute(&mut self, objects: &ObjectStore, solver: &mut dyn Solver) -> Result<(), String> {
        check_loop_solver(solver, &self.optimizer)?;
        match self.state {
            ResultState::Unregistered => {
                let id = solver.register_result(ResultKind::Objective, &self.objective_name);
                self.state = ResultState::Registered(id);
            }
            ResultState::Registered(id) | ResultState::Reporting(id) => {
                let value = self.objective.evaluate(objects)?;
                solver.report_result(id, value)?;
                self.state = ResultState::Reporting(id);
            }
        }
        Ok(())
    }

    pub(crate) fn run_complete(&mut self) {
        self.state = ResultState::Unregistered;
    }
}
