use script::TextParser;
use script::brackets::unquoted;

use crate::command::minimize::{ResultState, check_loop_solver, check_solver, split_solver_call};
use crate::command::{InitContext, ObjectType, require_objects};
use crate::expression::Expression;
use crate::objects::ObjectStore;
use crate::solver::{ConstraintKind, ResultKind, Solver};
use crate::wrapper::ElementWrapper;

/// `NonlinearConstraint optimizer(arg1 <= arg2)`, also `>=` and `=`.
#[derive(Debug, Clone)]
pub struct NonlinearConstraint {
    optimizer: String,
    arg1_name: String,
    arg1: ElementWrapper,
    operator: ConstraintKind,
    arg2_name: String,
    arg2: Expression,
    state: ResultState,
}

impl NonlinearConstraint {
    pub fn parse(arguments: &str, parser: &TextParser) -> Result<Self, String> {
        let (optimizer, constraint) = split_solver_call(arguments, parser)?;
        let (at, width, operator) = find_constraint_operator(&constraint)?;

        let arg1_name = constraint[..at].trim().to_string();
        let arg2_name = constraint[at + width..].trim().to_string();
        if arg1_name.is_empty() || arg2_name.is_empty() {
            return Err(format!("incomplete constraint \"{}\"", constraint));
        }
        let arg1 = ElementWrapper::parse(&arg1_name)?;
        if matches!(arg1, ElementWrapper::Number(_)) {
            return Err(format!(
                "constrained value \"{}\" must be a variable or parameter",
                arg1_name
            ));
        }
        let arg2 = Expression::parse(&arg2_name)?;

        Ok(NonlinearConstraint {
            optimizer,
            arg1_name,
            arg1,
            operator,
            arg2_name,
            arg2,
            state: ResultState::Unregistered,
        })
    }

    pub fn optimizer_name(&self) -> &str {
        &self.optimizer
    }

    pub fn arg1_name(&self) -> &str {
        &self.arg1_name
    }

    pub fn arg2_name(&self) -> &str {
        &self.arg2_name
    }

    pub fn operator(&self) -> ConstraintKind {
        self.operator
    }

    pub fn is_inequality(&self) -> bool {
        self.operator != ConstraintKind::Equality
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    /// The value handed to the solver: non-positive when satisfied for
    /// inequalities, zero when satisfied for equalities.
    pub fn constraint_value(&self, objects: &ObjectStore) -> Result<f64, String> {
        let arg1 = self.arg1.evaluate(objects)?;
        let arg2 = self.arg2.evaluate(objects)?;
        Ok(match self.operator {
            ConstraintKind::LessOrEqual | ConstraintKind::Equality => arg1 - arg2,
            ConstraintKind::GreaterOrEqual => arg2 - arg1,
        })
    }

    fn parameter_names(&self) -> Vec<String> {
        let mut names = self.arg1.ref_names();
        for name in self.arg2.ref_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Vec<String> {
        match object_type {
            ObjectType::Solver => vec![self.optimizer.clone()],
            ObjectType::Parameter => self.parameter_names(),
            ObjectType::Spacecraft => {
                let mut owners: Vec<String> = self.arg1.owner().map(str::to_string).into_iter().collect();
                for owner in self.arg2.owners() {
                    if !owners.contains(&owner) {
                        owners.push(owner);
                    }
                }
                owners
            }
            ObjectType::Any => {
                let mut names = vec![self.optimizer.clone()];
                names.extend(self.parameter_names());
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
        if object_type == ObjectType::Solver {
            return renamed;
        }
        if self.arg1.rename(old, new) {
            self.arg1_name = self.arg1.to_string();
            renamed = true;
        }
        if self.arg2.rename(old, new) {
            self.arg2_name = crate::command::replace_whole_word(&self.arg2_name, old, new);
            renamed = true;
        }
        renamed
    }

    pub(crate) fn initialize(&self, context: &InitContext<'_>) -> Result<(), String> {
        check_solver(context, &self.optimizer)?;
        require_objects(context.objects, &self.parameter_names())
    }

    /// Register the constraint on the first call, report its value on every
    /// later one.
    pub fn execute(&mut self, objects: &ObjectStore, solver: &mut dyn Solver) -> Result<(), String> {
        check_loop_solver(solver, &self.optimizer)?;
        match self.state {
            ResultState::Unregistered => {
                let id = solver.register_result(ResultKind::Constraint(self.operator), &self.arg1_name);
                self.state = ResultState::Registered(id);
            }
            ResultState::Registered(id) | ResultState::Reporting(id) => {
                let value = self.constraint_value(objects)?;
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

/// Offset, width and kind of the relational operator. Strict comparisons
/// are rejected.
fn find_constraint_operator(text: &str) -> Result<(usize, usize, ConstraintKind), String> {
    let chars: Vec<(usize, char)> = unquoted(text).collect();
    for (n, &(i, c)) in chars.iter().enumerate() {
        let next = chars.get(n + 1).map(|&(_, c)| c);
        match (c, next) {
            ('<', Some('=')) => return Ok((i, 2, ConstraintKind::LessOrEqual)),
            ('>', Some('=')) => return Ok((i, 2, ConstraintKind::GreaterOrEqual)),
            ('=', Some('=')) => return Ok((i, 2, ConstraintKind::Equality)),
            ('=', _) => return Ok((i, 1, ConstraintKind::Equality)),
            ('<' | '>', _) => {
                return Err(format!(
                    "strict inequality in \"{}\", use \"<=\" or \">=\"",
                    text
                ));
            }
            _ => {}
        }
    }
    Err(format!("expecting \"<=\", \">=\" or \"=\" in \"{}\"", text))
}
