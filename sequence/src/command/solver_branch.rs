use std::collections::BTreeMap;
use std::fmt;

use script::{BracketPair, TextParser};
use script::brackets::is_identifier;

use crate::command::minimize::check_solver;
use crate::command::{InitContext, ObjectType};

/// How an `Optimize`/`Target` loop treats its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveMode {
    /// Iterate until the solver finishes.
    #[default]
    Solve,
    /// Run the body once with the initial guesses and stop.
    RunInitialGuess,
}

impl SolveMode {
    fn parse(text: &str) -> Result<Self, String> {
        match text {
            "Solve" => Ok(SolveMode::Solve),
            "RunInitialGuess" => Ok(SolveMode::RunInitialGuess),
            other => Err(format!("unknown SolveMode \"{}\"", other)),
        }
    }
}

impl fmt::Display for SolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolveMode::Solve => "Solve",
            SolveMode::RunInitialGuess => "RunInitialGuess",
        })
    }
}

const OPTIONS: &[&str] = &["SolveMode", "ExitMode", "ShowProgressWindow"];

/// `Optimize solver {Option = value, ...}` and the matching `Target` form.
#[derive(Debug, Clone)]
pub struct SolverBranch {
    solver: String,
    options: BTreeMap<String, String>,
    solve_mode: SolveMode,
}

impl SolverBranch {
    pub fn parse(arguments: &str, parser: &TextParser) -> Result<Self, String> {
        let tokens = parser
            .decompose(arguments, BracketPair::Brace, false, false)
            .map_err(|e| e.to_string())?;

        let (solver, option_block) = match tokens.as_slice() {
            [] => return Err("solver name missing".to_string()),
            [solver] => (solver, None),
            [solver, options] if options.starts_with('{') => (solver, Some(options)),
            _ => {
                return Err(format!(
                    "expecting \"solver {{options}}\", got \"{}\"",
                    arguments.trim()
                ));
            }
        };
        if !is_identifier(solver) {
            return Err(format!("\"{}\" is not a valid solver name", solver));
        }

        let mut branch = SolverBranch {
            solver: solver.clone(),
            options: BTreeMap::new(),
            solve_mode: SolveMode::default(),
        };
        let Some(option_block) = option_block else {
            return Ok(branch);
        };

        let entries = parser
            .separate_brackets(option_block, BracketPair::Brace, ",", true)
            .map_err(|e| e.to_string())?;
        for entry in entries {
            let (key, value) = entry
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| format!("expecting \"Option = value\", got \"{}\"", entry))?;
            if !OPTIONS.contains(&key) {
                return Err(format!("unknown option \"{}\"", key));
            }
            if key == "SolveMode" {
                branch.solve_mode = SolveMode::parse(value)?;
            }
            branch.options.insert(key.to_string(), value.to_string());
        }
        Ok(branch)
    }

    pub fn solver(&self) -> &str {
        &self.solver
    }

    pub fn solve_mode(&self) -> SolveMode {
        self.solve_mode
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Vec<String> {
        match object_type {
            ObjectType::Any | ObjectType::Solver => vec![self.solver.clone()],
            _ => Vec::new(),
        }
    }

    pub(crate) fn rename(&mut self, old: &str, new: &str) -> bool {
        if self.solver == old {
            self.solver = new.to_string();
            true
        } else {
            false
        }
    }

    pub(crate) fn initialize(&self, context: &InitContext<'_>) -> Result<(), String> {
        check_solver(context, &self.solver)
    }
}
