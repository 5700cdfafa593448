use crate::common::{Error, Result};
use crate::types::field::Label;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The semantic type of a value.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    /// Untyped or not yet known, e.g. a column read from a CSV header.
    Unknown,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "varchar"),
            DataType::Unknown => write!(f, "unknown"),
        }
    }
}

impl DataType {
    pub fn from_string(data_type: &str) -> Result<DataType> {
        match data_type.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(DataType::Bool),
            "int" | "integer" => Ok(DataType::Int),
            "float" | "number" => Ok(DataType::Float),
            "text" | "string" | "varchar" => Ok(DataType::Text),
            "unknown" => Ok(DataType::Unknown),
            _ => Err(Error::InvalidInput(format!(
                "Unrecognized Data Type: {data_type}"
            ))),
        }
    }
}

/// An output column of a projection: a label and the semantic type of the
/// values emitted under it.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Column {
    label: Label,
    data_type: DataType,
}

impl Column {
    pub fn new(name: &str, data_type: DataType) -> Column {
        Column {
            label: Label::parse(name),
            data_type,
        }
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn name(&self) -> &str {
        self.label.as_header()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.data_type)
    }
}

/// Describes the columns a job emits, in output order.
#[derive(PartialEq, Clone, Debug, Default, Serialize, Deserialize)]
pub struct Projection {
    columns: Vec<Column>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column(&mut self, name: &str, data_type: DataType) {
        self.columns.push(Column::new(name, data_type));
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn labels(&self) -> Vec<Label> {
        self.columns.iter().map(|c| c.label().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl From<Vec<Column>> for Projection {
    fn from(columns: Vec<Column>) -> Self {
        Self { columns }
    }
}
