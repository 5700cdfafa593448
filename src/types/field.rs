use crate::common::{Error, Result};
use crate::errinput;
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Rem, Sub};

/// A loosely typed column value. Sources hand out whatever their backend
/// stores; CSV sources only ever produce strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Field {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Null, Field::Null) => true,
            (Field::Boolean(b), Field::Boolean(b2)) => b == b2,
            (Field::Integer(i), Field::Integer(i2)) => i == i2,
            // match on NaN as well as equality
            (Field::Float(f), Field::Float(f2)) => (f == f2) || (f.is_nan() && f2.is_nan()),
            (Field::String(s), Field::String(s2)) => s == s2,
            _ => false,
        }
    }
}

impl Eq for Field {}

impl std::hash::Hash for Field {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Field::Null => {}
            Field::Boolean(b) => b.hash(state),
            Field::Integer(i) => i.hash(state),
            Field::Float(f) => {
                if f.is_nan() {
                    0.hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Field::String(s) => s.hash(state),
        }
    }
}

// for use in sorting and comparison predicates
impl Ord for Field {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Field::Null, Field::Null) => Ordering::Equal,
            (Field::Null, _) => Ordering::Less,
            (_, Field::Null) => Ordering::Greater,
            (Field::Boolean(b), Field::Boolean(b2)) => b.cmp(b2),
            (Field::Integer(i), Field::Integer(i2)) => i.cmp(i2),
            (Field::Integer(i), Field::Float(f)) => cmp_float(*i as f64, *f),
            (Field::Float(f), Field::Integer(i)) => cmp_float(*f, *i as f64),
            (Field::Float(f), Field::Float(f2)) => cmp_float(*f, *f2),
            (Field::String(s), Field::String(s2)) => s.cmp(s2),
            (Field::Boolean(_), _) => Ordering::Less,
            (Field::Integer(_) | Field::Float(_), Field::Boolean(_)) => Ordering::Greater,
            (Field::Integer(_) | Field::Float(_), _) => Ordering::Less,
            (Field::String(_), _) => Ordering::Greater,
        }
    }
}

fn cmp_float(a: f64, b: f64) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Field {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other).unwrap_or(Field::Null)
    }
}

impl Sub for Field {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other).unwrap_or(Field::Null)
    }
}

impl Mul for Field {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        self.checked_mul(&other).unwrap_or(Field::Null)
    }
}

impl Div for Field {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        self.checked_div(&other).unwrap_or(Field::Null)
    }
}

impl Rem for Field {
    type Output = Self;

    fn rem(self, other: Self) -> Self {
        self.checked_mod(&other).unwrap_or(Field::Null)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => b.fmt(f),
            Self::Integer(integer) => integer.fmt(f),
            Self::Float(float) => float.fmt(f),
            Self::String(string) => f.write_str(string),
        }
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Float(v)
    }
}

impl From<f32> for Field {
    fn from(v: f32) -> Self {
        Field::Float(v as f64)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Integer(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Integer(v as i64)
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::String(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::String(v.to_owned())
    }
}

impl From<bool> for Field {
    fn from(v: bool) -> Self {
        Field::Boolean(v)
    }
}

impl Field {
    /// The semantic type of the value's runtime kind. Null has no type.
    pub fn get_type(&self) -> DataType {
        match self {
            Field::Null => DataType::Unknown,
            Field::Boolean(_) => DataType::Bool,
            Field::Integer(_) => DataType::Int,
            Field::Float(_) => DataType::Float,
            Field::String(_) => DataType::Text,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Returns true if the value is undefined (NULL or NaN).
    pub fn is_undefined(&self) -> bool {
        *self == Self::Null || matches!(self, Self::Float(f) if f.is_nan())
    }

    /// Interprets the value as a SQL truth value. Strings are accepted so that
    /// untyped sources (CSV) can be filtered on.
    pub fn truthy(&self) -> Result<Option<bool>> {
        match self {
            Field::Null => Ok(None),
            Field::Boolean(b) => Ok(Some(*b)),
            Field::Integer(i) => Ok(Some(*i != 0)),
            Field::String(s) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Field::String(s) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            value => errinput!("{value} is not a boolean"),
        }
    }

    /// Coerces a string holding a number into a numeric value, leaving every
    /// other value as is. Used when comparing untyped source values against
    /// numeric constants.
    pub fn coerce_numeric(&self) -> Field {
        match self {
            Field::String(s) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    Field::Integer(i)
                } else if let Ok(f) = s.trim().parse::<f64>() {
                    Field::Float(f)
                } else {
                    self.clone()
                }
            }
            _ => self.clone(),
        }
    }

    /// Compares two values, coercing numeric strings when the other side is
    /// numeric. Returns None if either side is NULL.
    pub fn compare(&self, other: &Field) -> Option<std::cmp::Ordering> {
        use Field::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (String(_), Integer(_) | Float(_)) => Some(self.coerce_numeric().cmp(other)),
            (Integer(_) | Float(_), String(_)) => Some(self.cmp(&other.coerce_numeric())),
            _ => Some(self.cmp(other)),
        }
    }

    pub fn checked_add(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self.coerce_numeric(), other.coerce_numeric()) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_add(rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(lhs as f64 + rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs + rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs + rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => Result::from(Error::InvalidData(format!(
                "Cannot add {:?} and {:?}",
                self, other
            ))),
        }
    }

    pub fn checked_sub(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self.coerce_numeric(), other.coerce_numeric()) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_sub(rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(lhs as f64 - rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs - rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs - rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => Result::from(Error::InvalidData(format!(
                "Cannot subtract {:?} and {:?}",
                self, other
            ))),
        }
    }

    pub fn checked_mul(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self.coerce_numeric(), other.coerce_numeric()) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_mul(rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(lhs as f64 * rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs * rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs * rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => Result::from(Error::InvalidData(format!(
                "Cannot multiply {:?} and {:?}",
                self, other
            ))),
        }
    }

    pub fn checked_div(&self, other: &Field) -> Result<Field> {
        use Field::*;
        let (lhs, rhs) = (self.coerce_numeric(), other.coerce_numeric());
        if matches!(rhs, Integer(0)) || matches!(rhs, Float(f) if f == 0.0) {
            return Err(Error::InvalidData("Division by zero".to_string()));
        }
        match (lhs, rhs) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_rem(rhs) {
                Some(0) => Ok(Integer(lhs / rhs)),
                Some(_) => Ok(Float(lhs as f64 / rhs as f64)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(lhs as f64 / rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs / rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs / rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => Err(Error::InvalidData(format!(
                "Cannot divide {:?} and {:?}",
                self, other
            ))),
        }
    }

    pub fn checked_mod(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self.coerce_numeric(), other.coerce_numeric()) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_rem(rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(lhs as f64 % rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs % rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs % rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => Result::from(Error::InvalidData(format!(
                "Cannot mod {:?} and {:?}",
                self, other
            ))),
        }
    }
}

/// A column label, used in query results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Label {
    /// No label.
    None,
    /// An unqualified column name.
    Unqualified(String),
    /// A fully qualified source/column name.
    Qualified(String, String),
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Unqualified(name) => write!(f, "{name}"),
            Self::Qualified(table, column) => write!(f, "{table}.{column}"),
        }
    }
}

impl Label {
    /// Parses a possibly dotted column name, e.g. `users.id`.
    pub fn parse(name: &str) -> Label {
        match name.split_once('.') {
            Some((source, column)) => Label::Qualified(source.to_string(), column.to_string()),
            None if name.is_empty() => Label::None,
            None => Label::Unqualified(name.to_string()),
        }
    }

    /// Formats the label as a short column header.
    pub fn as_header(&self) -> &str {
        match self {
            Self::Qualified(_, column) | Self::Unqualified(column) => column.as_str(),
            Self::None => "?",
        }
    }
}

impl From<Option<String>> for Label {
    fn from(name: Option<String>) -> Self {
        name.map(Label::Unqualified).unwrap_or(Label::None)
    }
}
