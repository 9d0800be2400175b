use std::fmt;

use script::brackets::{BracketPair, find_matching_bracket, is_identifier};

use crate::objects::{ARRAY_TYPE, ObjectStore, VALUE_PARAMETER, VARIABLE_TYPE};

/// A script operand that commands evaluate and assign uniformly.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementWrapper {
    Number(f64),
    /// A `Variable` object.
    Variable(String),
    /// `Owner.Parameter`, e.g. `Sat1.SMA`.
    ObjectParameter { owner: String, parameter: String },
    /// `A(i)` or `A(i,j)`, one-based.
    ArrayElement {
        array: String,
        row: Box<ElementWrapper>,
        column: Option<Box<ElementWrapper>>,
    },
}

impl ElementWrapper {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("missing operand".to_string());
        }
        if text.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
            return text
                .parse::<f64>()
                .map(ElementWrapper::Number)
                .map_err(|_| format!("\"{}\" is not a valid number", text));
        }

        if text.ends_with(')') {
            let span = find_matching_bracket(text, BracketPair::Paren, 0)
                .span()
                .filter(|span| span.close + 1 == text.len())
                .ok_or_else(|| format!("unbalanced parentheses in \"{}\"", text))?;
            let array = &text[..span.open];
            if !is_identifier(array) {
                return Err(format!("\"{}\" is not a valid array name", array));
            }
            let indices = &text[span.open + 1..span.close];
            let (row, column) = match indices.split_once(',') {
                Some((row, column)) => (row, Some(column)),
                None => (indices, None),
            };
            return Ok(ElementWrapper::ArrayElement {
                array: array.to_string(),
                row: Box::new(ElementWrapper::parse(row)?),
                column: column.map(ElementWrapper::parse).transpose()?.map(Box::new),
            });
        }

        if let Some((owner, parameter)) = text.split_once('.') {
            if is_identifier(owner) && parameter.split('.').all(is_identifier) {
                return Ok(ElementWrapper::ObjectParameter {
                    owner: owner.to_string(),
                    parameter: parameter.to_string(),
                });
            }
        } else if is_identifier(text) {
            return Ok(ElementWrapper::Variable(text.to_string()));
        }

        Err(format!(
            "\"{}\" is not a number, variable, array element or object parameter",
            text
        ))
    }

    /// Names of the objects this operand reads or writes.
    pub fn ref_names(&self) -> Vec<String> {
        match self {
            ElementWrapper::Number(_) => Vec::new(),
            ElementWrapper::Variable(name) => vec![name.clone()],
            ElementWrapper::ObjectParameter { owner, .. } => vec![owner.clone()],
            ElementWrapper::ArrayElement { array, row, column } => {
                let mut names = vec![array.clone()];
                names.extend(row.ref_names());
                if let Some(column) = column {
                    names.extend(column.ref_names());
                }
                names
            }
        }
    }

    /// The owner of an `Owner.Parameter` operand.
    pub fn owner(&self) -> Option<&str> {
        match self {
            ElementWrapper::ObjectParameter { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Rename every object reference equal to `old`.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self {
            ElementWrapper::Number(_) => false,
            ElementWrapper::Variable(name) | ElementWrapper::ObjectParameter { owner: name, .. } => {
                if name == old {
                    *name = new.to_string();
                    true
                } else {
                    false
                }
            }
            ElementWrapper::ArrayElement { array, row, column } => {
                let mut renamed = row.rename(old, new);
                if let Some(column) = column {
                    renamed |= column.rename(old, new);
                }
                if array == old {
                    *array = new.to_string();
                    renamed = true;
                }
                renamed
            }
        }
    }

    pub fn evaluate(&self, objects: &ObjectStore) -> Result<f64, String> {
        match self {
            ElementWrapper::Number(value) => Ok(*value),
            ElementWrapper::Variable(name) => {
                let object = objects
                    .get(name)
                    .ok_or_else(|| format!("undefined object \"{}\"", name))?;
                if object.type_name() != VARIABLE_TYPE {
                    return Err(format!(
                        "\"{}\" is a {}, not a Variable",
                        name,
                        object.type_name()
                    ));
                }
                Ok(object.parameter(VALUE_PARAMETER).unwrap_or(0.0))
            }
            ElementWrapper::ObjectParameter { owner, parameter } => objects
                .get(owner)
                .ok_or_else(|| format!("undefined object \"{}\"", owner))?
                .parameter(parameter)
                .ok_or_else(|| format!("object \"{}\" has no parameter \"{}\"", owner, parameter)),
            ElementWrapper::ArrayElement { array, .. } => {
                let key = self.element_key(objects)?;
                objects
                    .get(array)
                    .and_then(|object| object.parameter(&key))
                    .ok_or_else(|| format!("index {} out of range for \"{}\"", key, array))
            }
        }
    }

    pub fn assign(&self, objects: &mut ObjectStore, value: f64) -> Result<(), String> {
        match self {
            ElementWrapper::Number(number) => Err(format!("cannot assign to the number {}", number)),
            ElementWrapper::Variable(name) => {
                let object = objects
                    .get_mut(name)
                    .ok_or_else(|| format!("undefined object \"{}\"", name))?;
                if object.type_name() != VARIABLE_TYPE {
                    return Err(format!(
                        "\"{}\" is a {}, not a Variable",
                        name,
                        object.type_name()
                    ));
                }
                object.set_parameter(VALUE_PARAMETER, value);
                Ok(())
            }
            ElementWrapper::ObjectParameter { owner, parameter } => {
                let object = objects
                    .get_mut(owner)
                    .ok_or_else(|| format!("undefined object \"{}\"", owner))?;
                object.set_parameter(parameter, value);
                Ok(())
            }
            ElementWrapper::ArrayElement { array, .. } => {
                let key = self.element_key(objects)?;
                let object = objects
                    .get_mut(array)
                    .ok_or_else(|| format!("undefined object \"{}\"", array))?;
                object.set_parameter(&key, value);
                Ok(())
            }
        }
    }

    /// The `(row,col)` parameter key addressed by an array element.
    fn element_key(&self, objects: &ObjectStore) -> Result<String, String> {
        let ElementWrapper::ArrayElement { array, row, column } = self else {
            return Err("not an array element".to_string());
        };
        let object = objects
            .get(array)
            .ok_or_else(|| format!("undefined object \"{}\"", array))?;
        if object.type_name() != ARRAY_TYPE {
            return Err(format!("\"{}\" is a {}, not an Array", array, object.type_name()));
        }
        let (rows, columns) = object.dimensions().unwrap_or((0, 0));

        let first = index_value(row.evaluate(objects)?)?;
        let (r, c) = match column {
            Some(column) => (first, index_value(column.evaluate(objects)?)?),
            None if rows == 1 => (1, first),
            None if columns == 1 => (first, 1),
            None => return Err(format!("\"{}\" needs a row and a column index", array)),
        };
        if r > rows || c > columns {
            return Err(format!("index ({},{}) out of range for \"{}\"", r, c, array));
        }
        Ok(format!("({},{})", r, c))
    }
}

fn index_value(value: f64) -> Result<usize, String> {
    if value >= 1.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(format!("array index {} must be a positive integer", value))
    }
}

impl fmt::Display for ElementWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementWrapper::Number(value) => write!(f, "{}", value),
            ElementWrapper::Variable(name) => f.write_str(name),
            ElementWrapper::ObjectParameter { owner, parameter } => {
                write!(f, "{}.{}", owner, parameter)
            }
            ElementWrapper::ArrayElement { array, row, column } => match column {
                Some(column) => write!(f, "{}({},{})", array, row, column),
                None => write!(f, "{}({})", array, row),
            },
        }
    }
}
