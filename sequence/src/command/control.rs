use std::fmt;

use script::brackets::{BracketPair, find_matching_bracket, unquoted};

use crate::command::{ObjectType, require_objects};
use crate::expression::Expression;
use crate::objects::ObjectStore;
use crate::wrapper::ElementWrapper;

// ---------------------------------------------------------------------------
// Conditions (If, While)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalOperator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl RelationalOperator {
    fn apply(self, left: f64, right: f64) -> bool {
        match self {
            RelationalOperator::Equal => left == right,
            RelationalOperator::NotEqual => left != right,
            RelationalOperator::Less => left < right,
            RelationalOperator::Greater => left > right,
            RelationalOperator::LessOrEqual => left <= right,
            RelationalOperator::GreaterOrEqual => left >= right,
        }
    }
}

impl fmt::Display for RelationalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelationalOperator::Equal => "==",
            RelationalOperator::NotEqual => "~=",
            RelationalOperator::Less => "<",
            RelationalOperator::Greater => ">",
            RelationalOperator::LessOrEqual => "<=",
            RelationalOperator::GreaterOrEqual => ">=",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub left: Expression,
    pub operator: RelationalOperator,
    pub right: Expression,
}

/// Comparisons joined by `&` and `|`, evaluated left to right with no
/// precedence between the two.
#[derive(Debug, Clone)]
pub struct Condition {
    first: Comparison,
    rest: Vec<(LogicalOperator, Comparison)>,
}

impl Condition {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut pieces = split_logical(strip_outer_parens(text)).into_iter();
        let Some((_, first)) = pieces.next() else {
            return Err("missing condition".to_string());
        };
        let first = parse_comparison(first)?;
        let rest = pieces
            .map(|(operator, piece)| Ok((operator, parse_comparison(piece)?)))
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Condition { first, rest })
    }

    pub fn comparisons(&self) -> impl Iterator<Item = &Comparison> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, c)| c))
    }

    pub fn evaluate(&self, objects: &ObjectStore) -> Result<bool, String> {
        let mut result = evaluate_comparison(&self.first, objects)?;
        for (operator, comparison) in &self.rest {
            let value = evaluate_comparison(comparison, objects)?;
            result = match operator {
                LogicalOperator::And => result && value,
                LogicalOperator::Or => result || value,
            };
        }
        Ok(result)
    }

    fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.comparisons().flat_map(|c| [&c.left, &c.right])
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Option<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for expression in self.expressions() {
            let found = match object_type {
                ObjectType::Any | ObjectType::Parameter => expression.ref_names(),
                ObjectType::Spacecraft => expression.owners(),
                _ => return None,
            };
            for name in found {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Some(names)
    }

    pub(crate) fn rename(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = false;
        for comparison in std::iter::once(&mut self.first).chain(self.rest.iter_mut().map(|(_, c)| c)) {
            renamed |= comparison.left.rename(old, new);
            renamed |= comparison.right.rename(old, new);
        }
        renamed
    }

    pub(crate) fn initialize(&self, objects: &ObjectStore) -> Result<(), String> {
        for expression in self.expressions() {
            require_objects(objects, &expression.ref_names())?;
        }
        Ok(())
    }
}

fn evaluate_comparison(comparison: &Comparison, objects: &ObjectStore) -> Result<bool, String> {
    let left = comparison.left.evaluate(objects)?;
    let right = comparison.right.evaluate(objects)?;
    Ok(comparison.operator.apply(left, right))
}

/// Split at top-level `&`/`|` (doubled forms included). The first piece is
/// paired with `And`, which is ignored.
fn split_logical(text: &str) -> Vec<(LogicalOperator, &str)> {
    let mut pieces = Vec::new();
    let mut operator = LogicalOperator::And;
    let mut start = 0;
    let mut depth = 0usize;
    let mut skip_next = false;

    for (i, c) in unquoted(text) {
        if skip_next {
            skip_next = false;
            start = i + 1;
            continue;
        }
        if BracketPair::from_open(c).is_some() {
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && (c == '&' || c == '|') {
            pieces.push((operator, text[start..i].trim()));
            operator = if c == '&' {
                LogicalOperator::And
            } else {
                LogicalOperator::Or
            };
            start = i + 1;
            skip_next = text[i + 1..].starts_with(c);
        }
    }
    pieces.push((operator, text[start..].trim()));
    pieces
}

/// `(x > 1)` reads as `x > 1`.
fn strip_outer_parens(text: &str) -> &str {
    let mut text = text.trim();
    while let Some(span) = find_matching_bracket(text, BracketPair::Paren, 0)
        .span()
        .filter(|span| span.is_outer)
    {
        text = text[span.open + 1..span.close].trim();
    }
    text
}

fn parse_comparison(text: &str) -> Result<Comparison, String> {
    const OPERATORS: &[(&str, RelationalOperator)] = &[
        ("==", RelationalOperator::Equal),
        ("~=", RelationalOperator::NotEqual),
        ("!=", RelationalOperator::NotEqual),
        ("<=", RelationalOperator::LessOrEqual),
        (">=", RelationalOperator::GreaterOrEqual),
        ("<", RelationalOperator::Less),
        (">", RelationalOperator::Greater),
    ];

    let text = strip_outer_parens(text);
    let mut depth = 0usize;
    for (i, c) in unquoted(text) {
        if BracketPair::from_open(c).is_some() {
            depth += 1;
        } else if BracketPair::from_close(c).is_some() {
            depth = depth.saturating_sub(1);
        } else if depth == 0 {
            let rest = &text[i..];
            if let Some((symbol, operator)) = OPERATORS.iter().find(|(s, _)| rest.starts_with(s)) {
                let left = text[..i].trim();
                let right = text[i + symbol.len()..].trim();
                if left.is_empty() || right.is_empty() {
                    return Err(format!("incomplete comparison \"{}\"", text.trim()));
                }
                return Ok(Comparison {
                    left: Expression::parse(left)?,
                    operator: *operator,
                    right: Expression::parse(right)?,
                });
            }
        }
    }
    Err(format!("expecting a relational operator in \"{}\"", text.trim()))
}

// ---------------------------------------------------------------------------
// For loops
// ---------------------------------------------------------------------------

/// `index = start:end` or `index = start:step:end`.
#[derive(Debug, Clone)]
pub struct ForLoop {
    index: ElementWrapper,
    start: Expression,
    step: Option<Expression>,
    end: Expression,
}

impl ForLoop {
    pub fn parse(text: &str) -> Result<Self, String> {
        let (index, range) = text
            .split_once('=')
            .ok_or_else(|| format!("expecting \"index = start:end\" in \"{}\"", text.trim()))?;
        let index = ElementWrapper::parse(index)?;
        if matches!(index, ElementWrapper::Number(_)) {
            return Err("loop index must be a variable".to_string());
        }

        let parts: Vec<&str> = range.split(':').collect();
        let (start, step, end) = match parts.as_slice() {
            [start, end] => (start, None, end),
            [start, step, end] => (start, Some(step), end),
            _ => return Err(format!("expecting \"start:end\" or \"start:step:end\", got \"{}\"", range.trim())),
        };
        Ok(ForLoop {
            index,
            start: Expression::parse(start)?,
            step: step.map(|s| Expression::parse(s)).transpose()?,
            end: Expression::parse(end)?,
        })
    }

    pub fn index(&self) -> &ElementWrapper {
        &self.index
    }

    /// Evaluate `(start, step, end)` for one execution of the loop.
    pub fn bounds(&self, objects: &ObjectStore) -> Result<(f64, f64, f64), String> {
        let start = self.start.evaluate(objects)?;
        let step = match &self.step {
            Some(step) => step.evaluate(objects)?,
            None => 1.0,
        };
        let end = self.end.evaluate(objects)?;
        if step == 0.0 {
            return Err("loop step cannot be zero".to_string());
        }
        Ok((start, step, end))
    }

    fn expressions(&self) -> impl Iterator<Item = &Expression> {
        [&self.start, &self.end].into_iter().chain(self.step.as_ref())
    }

    pub(crate) fn ref_object_names(&self, object_type: ObjectType) -> Option<Vec<String>> {
        let mut names = match object_type {
            ObjectType::Any | ObjectType::Parameter => self.index.ref_names(),
            ObjectType::Spacecraft => self.index.owner().map(str::to_string).into_iter().collect(),
            _ => return None,
        };
        for expression in self.expressions() {
            let found = match object_type {
                ObjectType::Spacecraft => expression.owners(),
                _ => expression.ref_names(),
            };
            for name in found {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Some(names)
    }

    pub(crate) fn rename(&mut self, old: &str, new: &str) -> bool {
        let mut renamed = self.index.rename(old, new);
        renamed |= self.start.rename(old, new);
        renamed |= self.end.rename(old, new);
        if let Some(step) = &mut self.step {
            renamed |= step.rename(old, new);
        }
        renamed
    }

    pub(crate) fn initialize(&self, objects: &ObjectStore) -> Result<(), String> {
        require_objects(objects, &self.index.ref_names())?;
        for expression in self.expressions() {
            require_objects(objects, &expression.ref_names())?;
        }
        Ok(())
    }
}
