use crate::common::{Error, Result};
use crate::datasource::Message;
use crate::errinput;
use crate::types::field::Field;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// An expression, made up of nested operations and values. Values are either
/// constants or named column references, resolved against a message's column
/// index. Evaluates to a Field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// A constant value.
    Constant(Field),
    /// A column reference, optionally qualified (`source.column`).
    Column(String),

    /// Logical AND of two booleans: a AND b.
    And(Box<Expression>, Box<Expression>),
    /// Logical OR of two booleans: a OR b.
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT of a boolean: NOT a.
    Not(Box<Expression>),

    /// Equality comparison of two values: a = b.
    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    /// Greater than comparison of two values: a > b.
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    /// Less than comparison of two values: a < b.
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    /// Checks if a value is NULL: a IS NULL.
    IsNull(Box<Expression>),

    /// Adds two numbers: a + b.
    Add(Box<Expression>, Box<Expression>),
    /// Subtracts two numbers: a - b.
    Subtract(Box<Expression>, Box<Expression>),
    /// Multiplies two numbers: a * b.
    Multiply(Box<Expression>, Box<Expression>),
    /// Divides two numbers: a / b.
    Divide(Box<Expression>, Box<Expression>),
    /// The remainder after dividing two numbers: a % b.
    Modulo(Box<Expression>, Box<Expression>),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Expression::*;
        match self {
            Constant(Field::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Constant(value) => write!(f, "{value}"),
            Column(name) => write!(f, "{name}"),
            And(lhs, rhs) => write!(f, "{lhs} AND {rhs}"),
            Or(lhs, rhs) => write!(f, "{lhs} OR {rhs}"),
            Not(expr) => write!(f, "NOT {expr}"),
            Equal(lhs, rhs) => write!(f, "{lhs} = {rhs}"),
            NotEqual(lhs, rhs) => write!(f, "{lhs} != {rhs}"),
            GreaterThan(lhs, rhs) => write!(f, "{lhs} > {rhs}"),
            GreaterThanOrEqual(lhs, rhs) => write!(f, "{lhs} >= {rhs}"),
            LessThan(lhs, rhs) => write!(f, "{lhs} < {rhs}"),
            LessThanOrEqual(lhs, rhs) => write!(f, "{lhs} <= {rhs}"),
            IsNull(expr) => write!(f, "{expr} IS NULL"),
            Add(lhs, rhs) => write!(f, "{lhs} + {rhs}"),
            Subtract(lhs, rhs) => write!(f, "{lhs} - {rhs}"),
            Multiply(lhs, rhs) => write!(f, "{lhs} * {rhs}"),
            Divide(lhs, rhs) => write!(f, "{lhs} / {rhs}"),
            Modulo(lhs, rhs) => write!(f, "{lhs} % {rhs}"),
        }
    }
}

impl From<Field> for Expression {
    fn from(value: Field) -> Self {
        Expression::Constant(value)
    }
}

impl Expression {
    /// Shorthand for a column reference.
    pub fn column(name: &str) -> Self {
        Expression::Column(name.to_string())
    }

    /// Evaluates an expression against a message. Column references need a
    /// message; constant expressions don't.
    pub fn evaluate(&self, msg: Option<&Message>) -> Result<Field> {
        use Expression::*;
        Ok(match self {
            Constant(value) => value.clone(),
            Column(name) => match msg {
                Some(msg) => msg
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::InvalidInput(format!("unknown column {name}")))?,
                None => return errinput!("can't evaluate column {name} without a row"),
            },

            // Logical operations follow SQL three-valued logic.
            And(lhs, rhs) => match (
                lhs.evaluate(msg)?.truthy()?,
                rhs.evaluate(msg)?.truthy()?,
            ) {
                (Some(false), _) | (_, Some(false)) => Field::Boolean(false),
                (Some(true), Some(true)) => Field::Boolean(true),
                _ => Field::Null,
            },
            Or(lhs, rhs) => match (
                lhs.evaluate(msg)?.truthy()?,
                rhs.evaluate(msg)?.truthy()?,
            ) {
                (Some(true), _) | (_, Some(true)) => Field::Boolean(true),
                (Some(false), Some(false)) => Field::Boolean(false),
                _ => Field::Null,
            },
            Not(expr) => match expr.evaluate(msg)?.truthy()? {
                Some(b) => Field::Boolean(!b),
                None => Field::Null,
            },

            Equal(lhs, rhs) => compare(lhs, rhs, msg, |o| o == Ordering::Equal)?,
            NotEqual(lhs, rhs) => compare(lhs, rhs, msg, |o| o != Ordering::Equal)?,
            GreaterThan(lhs, rhs) => compare(lhs, rhs, msg, |o| o == Ordering::Greater)?,
            GreaterThanOrEqual(lhs, rhs) => compare(lhs, rhs, msg, |o| o != Ordering::Less)?,
            LessThan(lhs, rhs) => compare(lhs, rhs, msg, |o| o == Ordering::Less)?,
            LessThanOrEqual(lhs, rhs) => compare(lhs, rhs, msg, |o| o != Ordering::Greater)?,
            IsNull(expr) => Field::Boolean(expr.evaluate(msg)?.is_null()),

            Add(lhs, rhs) => lhs.evaluate(msg)?.checked_add(&rhs.evaluate(msg)?)?,
            Subtract(lhs, rhs) => lhs.evaluate(msg)?.checked_sub(&rhs.evaluate(msg)?)?,
            Multiply(lhs, rhs) => lhs.evaluate(msg)?.checked_mul(&rhs.evaluate(msg)?)?,
            Divide(lhs, rhs) => lhs.evaluate(msg)?.checked_div(&rhs.evaluate(msg)?)?,
            Modulo(lhs, rhs) => lhs.evaluate(msg)?.checked_mod(&rhs.evaluate(msg)?)?,
        })
    }

    /// Walks the expression tree depth-first, calling the visitor for every
    /// node. Halts and returns false if the visitor returns false.
    pub fn walk(&self, visitor: &mut impl FnMut(&Expression) -> bool) -> bool {
        use Expression::*;
        if !visitor(self) {
            return false;
        }
        match self {
            Constant(_) | Column(_) => true,
            Not(expr) | IsNull(expr) => expr.walk(visitor),
            And(lhs, rhs)
            | Or(lhs, rhs)
            | Equal(lhs, rhs)
            | NotEqual(lhs, rhs)
            | GreaterThan(lhs, rhs)
            | GreaterThanOrEqual(lhs, rhs)
            | LessThan(lhs, rhs)
            | LessThanOrEqual(lhs, rhs)
            | Add(lhs, rhs)
            | Subtract(lhs, rhs)
            | Multiply(lhs, rhs)
            | Divide(lhs, rhs)
            | Modulo(lhs, rhs) => lhs.walk(visitor) && rhs.walk(visitor),
        }
    }

    /// The column names referenced by the expression, in visiting order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        self.walk(&mut |expr| {
            if let Expression::Column(name) = expr {
                columns.push(name.clone());
            }
            true
        });
        columns
    }
}

fn compare(
    lhs: &Expression,
    rhs: &Expression,
    msg: Option<&Message>,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Field> {
    let (lhs, rhs) = (lhs.evaluate(msg)?, rhs.evaluate(msg)?);
    Ok(match lhs.compare(&rhs) {
        Some(ordering) => Field::Boolean(accept(ordering)),
        None => Field::Null,
    })
}
