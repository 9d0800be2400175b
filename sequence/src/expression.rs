//! Arithmetic over script operands: `+ - * / ^`, unary minus, parentheses
//! and a handful of built-in math functions.

use script::brackets::{BracketPair, LiteralTracker, find_matching_bracket};

use crate::objects::ObjectStore;
use crate::wrapper::ElementWrapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Operand(ElementWrapper),
    Negate(Box<Expression>),
    Function {
        name: &'static str,
        argument: Box<Expression>,
    },
    Binary {
        operator: MathOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

const FUNCTIONS: &[&str] = &[
    "sqrt", "abs", "sin", "cos", "tan", "asin", "acos", "atan", "exp", "log", "log10", "floor",
    "ceil",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Operand(String),
    Call(&'static str, String),
    Operator(MathOperator),
    Minus,
    LParen,
    RParen,
}

// Left bp, right bp. Power is right-associative and binds tighter than
// unary minus, so `-2^2` is `-(2^2)`.
const BP_ADDITIVE: u8 = 2;
const BP_MULTIPLICATIVE: u8 = 4;
const BP_UNARY: u8 = 6;
const BP_POWER: u8 = 8;

impl Expression {
    pub fn parse(text: &str) -> Result<Self, String> {
        let tokens = tokenize(text)?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let expression = parser.parse_expr(0)?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expression),
            Some(_) => Err(format!("unexpected text in expression \"{}\"", text.trim())),
        }
    }

    /// The expression as a single operand, when it is one.
    pub fn as_operand(&self) -> Option<&ElementWrapper> {
        match self {
            Expression::Operand(wrapper) => Some(wrapper),
            _ => None,
        }
    }

    pub fn ref_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit_operands(&mut |wrapper| {
            for name in wrapper.ref_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        });
        names
    }

    /// Owners of every `Owner.Parameter` operand.
    pub fn owners(&self) -> Vec<String> {
        let mut owners = Vec::new();
        self.visit_operands(&mut |wrapper| {
            if let Some(owner) = wrapper.owner() {
                if !owners.iter().any(|o| o == owner) {
                    owners.push(owner.to_string());
                }
            }
        });
        owners
    }

    fn visit_operands(&self, visit: &mut dyn FnMut(&ElementWrapper)) {
        match self {
            Expression::Operand(wrapper) => visit(wrapper),
            Expression::Negate(inner) | Expression::Function { argument: inner, .. } => {
                inner.visit_operands(visit)
            }
            Expression::Binary { left, right, .. } => {
                left.visit_operands(visit);
                right.visit_operands(visit);
            }
        }
    }

    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self {
            Expression::Operand(wrapper) => wrapper.rename(old, new),
            Expression::Negate(inner) | Expression::Function { argument: inner, .. } => {
                inner.rename(old, new)
            }
            Expression::Binary { left, right, .. } => {
                let renamed = left.rename(old, new);
                right.rename(old, new) || renamed
            }
        }
    }

    pub fn evaluate(&self, objects: &ObjectStore) -> Result<f64, String> {
        match self {
            Expression::Operand(wrapper) => wrapper.evaluate(objects),
            Expression::Negate(inner) => Ok(-inner.evaluate(objects)?),
            Expression::Function { name, argument } => {
                let x = argument.evaluate(objects)?;
                Ok(match *name {
                    "sqrt" => x.sqrt(),
                    "abs" => x.abs(),
                    "sin" => x.sin(),
                    "cos" => x.cos(),
                    "tan" => x.tan(),
                    "asin" => x.asin(),
                    "acos" => x.acos(),
                    "atan" => x.atan(),
                    "exp" => x.exp(),
                    "log" => x.ln(),
                    "log10" => x.log10(),
                    "floor" => x.floor(),
                    _ => x.ceil(),
                })
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let a = left.evaluate(objects)?;
                let b = right.evaluate(objects)?;
                match operator {
                    MathOperator::Add => Ok(a + b),
                    MathOperator::Subtract => Ok(a - b),
                    MathOperator::Multiply => Ok(a * b),
                    MathOperator::Divide if b == 0.0 => Err("division by zero".to_string()),
                    MathOperator::Divide => Ok(a / b),
                    MathOperator::Power => Ok(a.powf(b)),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tracker = LiteralTracker::default();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if tracker.step(c) {
            return Err(format!("string values are not numeric: \"{}\"", text.trim()));
        }
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Operator(MathOperator::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Operator(MathOperator::Multiply));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Operator(MathOperator::Divide));
                i += 1;
            }
            '^' => {
                tokens.push(Token::Operator(MathOperator::Power));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = i + 1;
                while end < chars.len() {
                    let d = chars[end].1;
                    let exponent_sign = (d == '+' || d == '-')
                        && matches!(chars[end - 1].1, 'e' | 'E');
                    if d.is_ascii_alphanumeric() || d == '.' || exponent_sign {
                        end += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Operand(slice(text, &chars, i, end).to_string()));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i + 1;
                while end < chars.len()
                    && (chars[end].1.is_ascii_alphanumeric() || matches!(chars[end].1, '_' | '.'))
                {
                    end += 1;
                }
                let name = slice(text, &chars, i, end);
                if end < chars.len() && chars[end].1 == '(' {
                    let open = chars[end].0;
                    let span = find_matching_bracket(text, BracketPair::Paren, open)
                        .span()
                        .ok_or_else(|| format!("unmatched parenthesis in \"{}\"", text.trim()))?;
                    let inside = &text[open + 1..span.close];
                    match FUNCTIONS.iter().find(|f| **f == name) {
                        Some(function) => tokens.push(Token::Call(*function, inside.to_string())),
                        None => tokens.push(Token::Operand(text[offset..=span.close].to_string())),
                    }
                    while i < chars.len() && chars[i].0 <= span.close {
                        i += 1;
                    }
                } else {
                    tokens.push(Token::Operand(name.to_string()));
                    i = end;
                }
            }
            _ => return Err(format!("unexpected character '{}' in \"{}\"", c, text.trim())),
        }
    }
    Ok(tokens)
}

fn slice<'a>(text: &'a str, chars: &[(usize, char)], start: usize, end: usize) -> &'a str {
    let from = chars[start].0;
    let to = chars.get(end).map(|&(offset, _)| offset).unwrap_or(text.len());
    &text[from..to]
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expression, String> {
        let mut left = self.parse_prefix()?;

        loop {
            let operator = match self.tokens.get(self.pos) {
                Some(Token::Operator(operator)) => *operator,
                Some(Token::Minus) => MathOperator::Subtract,
                _ => break,
            };
            let (l_bp, r_bp) = infix_bp(operator);
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;
            let right = self.parse_expr(r_bp)?;
            left = Expression::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, String> {
        match self.advance() {
            Some(Token::Operand(text)) => Ok(Expression::Operand(ElementWrapper::parse(&text)?)),
            Some(Token::Call(name, inside)) => Ok(Expression::Function {
                name,
                argument: Box::new(Expression::parse(&inside)?),
            }),
            Some(Token::Minus) => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(Expression::Negate(Box::new(operand)))
            }
            Some(Token::Operator(MathOperator::Add)) => self.parse_expr(BP_UNARY),
            Some(Token::LParen) => {
                let expression = self.parse_expr(0)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(expression),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected {:?} in expression", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn infix_bp(operator: MathOperator) -> (u8, u8) {
    match operator {
        MathOperator::Add | MathOperator::Subtract => (BP_ADDITIVE, BP_ADDITIVE + 1),
        MathOperator::Multiply | MathOperator::Divide => {
            (BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1)
        }
        MathOperator::Power => (BP_POWER, BP_POWER),
    }
}
