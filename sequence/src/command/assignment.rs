use script::brackets::is_identifier;
use script::{BracketPair, TextParser};

use crate::command::{ObjectType, require_objects};
use crate::expression::Expression;
use crate::objects::ObjectStore;
use crate::wrapper::ElementWrapper;

/// `target = expression`
#[derive(Debug, Clone)]
pub struct Assignment {
    target: ElementWrapper,
    value: Expression,
}

impl Assignment {
    pub fn parse(lhs: &str, rhs: &str) -> Result<Self, String> {
        let target = ElementWrapper::parse(lhs)?;
        if let ElementWrapper::Number(_) = target {
            return Err(format!("cannot assign to the number {}", lhs.trim()));
        }
        Ok(Assignment {
            target,
            value: Expression::parse(rhs)?,
        })
    }

    pub fn target(&self) -> &ElementWrapper {
        &self.target
    }

    pub fn value(&self) -> &Expression {
        &self.value
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Option<Vec<String>> {
        match object_type {
            ObjectType::Any | ObjectType::Parameter => {
                let mut names = self.target.ref_names();
                for name in self.value.ref_names() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                Some(names)
            }
            ObjectType::Spacecraft => {
                let mut owners: Vec<String> = self.target.owner().map(str::to_string).into_iter().collect();
                for owner in self.value.owners() {
                    if !owners.contains(&owner) {
                        owners.push(owner);
                    }
                }
                Some(owners)
            }
            ObjectType::Solver | ObjectType::Hardware | ObjectType::Function => None,
        }
    }

    pub(crate) fn rename(&mut self, old: &str, new: &str) -> bool {
        let renamed = self.target.rename(old, new);
        self.value.rename(old, new) || renamed
    }

    pub(crate) fn initialize(&self, objects: &ObjectStore) -> Result<(), String> {
        require_objects(objects, &self.target.ref_names())?;
        require_objects(objects, &self.value.ref_names())
    }

    pub fn execute(&self, objects: &mut ObjectStore) -> Result<f64, String> {
        let value = self.value.evaluate(objects)?;
        self.target.assign(objects, value)?;
        Ok(value)
    }
}

/// `[outputs] = Name(inputs)` or a bare `Name(inputs)`.
///
/// Function bodies are not part of a mission sequence; running one only
/// reports that it was skipped.
#[derive(Debug, Clone)]
pub struct CallFunction {
    name: String,
    outputs: Vec<String>,
    inputs: Vec<String>,
}

impl CallFunction {
    pub fn parse(lhs: &str, rhs: &str, parser: &TextParser) -> Result<Self, String> {
        let rhs = rhs.trim();
        let (name, arguments) = match rhs.find('(') {
            Some(open) => (rhs[..open].trim(), &rhs[open..]),
            None => (rhs, ""),
        };
        if !is_identifier(name) {
            return Err(format!("\"{}\" is not a valid function name", name));
        }

        let inputs = if arguments.is_empty() {
            Vec::new()
        } else {
            parser
                .separate_brackets(arguments, BracketPair::Paren, ",", true)
                .map_err(|e| e.message)?
        };

        let lhs = lhs.trim();
        let outputs = if lhs.starts_with('[') {
            parser
                .separate_brackets(lhs, BracketPair::Square, ", ", true)
                .map_err(|e| e.message)?
        } else if lhs.is_empty() {
            Vec::new()
        } else {
            vec![lhs.to_string()]
        };

        Ok(CallFunction {
            name: name.to_string(),
            outputs,
            inputs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Option<Vec<String>> {
        let arguments = || {
            let mut names: Vec<String> = Vec::new();
            for argument in self.outputs.iter().chain(&self.inputs) {
                for name in ElementWrapper::parse(argument)
                    .map(|w| w.ref_names())
                    .unwrap_or_default()
                {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            names
        };
        match object_type {
            ObjectType::Function => Some(vec![self.name.clone()]),
            ObjectType::Parameter => Some(arguments()),
            ObjectType::Any => {
                let mut names = vec![self.name.clone()];
                names.extend(arguments());
                Some(names)
            }
            ObjectType::Spacecraft | ObjectType::Solver | ObjectType::Hardware => None,
        }
    }

    pub(crate) fn rename(&mut self, object_type: ObjectType, old: &str, new: &str) -> bool {
        let mut renamed = false;
        if matches!(object_type, ObjectType::Function | ObjectType::Any) && self.name == old {
            self.name = new.to_string();
            renamed = true;
        }
        if object_type != ObjectType::Function {
            for argument in self.outputs.iter_mut().chain(self.inputs.iter_mut()) {
                let replaced = super::replace_whole_word(argument, old, new);
                if replaced != *argument {
                    *argument = replaced;
                    renamed = true;
                }
            }
        }
        renamed
    }
}
