// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for condition expressions

/// A condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Comparison expression: left op right
    Compare {
        left: Operand,
        op: CompareOp,
        right: Literal,
    },
    /// Bare operand, true when the value is truthy
    Truthy(Operand),
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
    /// Literal true
    True,
    /// Literal false
    False,
}

/// Left-hand side of a comparison: a dotted state path, optionally reduced
/// modulo a number
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub path: String,
    pub modulo: Option<f64>,
}

impl Operand {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            modulo: None,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring for strings, membership for arrays
    Contains,
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Contains => write!(f, "contains"),
        }
    }
}
