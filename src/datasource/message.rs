use crate::common::{Error, Result};
use crate::types::field::Field;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::slice::Iter;
use std::sync::Arc;

/// Maps a column name to its position in a row.
pub type ColumnIndex = HashMap<String, usize>;

/// Builds a column-name -> position index for an ordered column list.
pub fn build_column_index(columns: &[String]) -> ColumnIndex {
    columns
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// Builds an index holding both the plain and the `qualifier.`-prefixed name
/// of every column, so joined rows can be addressed by either.
pub fn qualify_column_index(index: &ColumnIndex, qualifier: &str) -> ColumnIndex {
    let mut qualified = index.clone();
    for (name, position) in index {
        if !name.contains('.') {
            qualified.insert(format!("{qualifier}.{name}"), *position);
        }
    }
    qualified
}

/// Positional column names of an index. For each position the unqualified
/// name wins over qualified aliases of the same column.
pub fn column_names(index: &ColumnIndex) -> Vec<String> {
    let width = index.values().map(|i| i + 1).max().unwrap_or(0);
    let mut names: Vec<Option<&String>> = vec![None; width];
    for (name, position) in index.iter().sorted() {
        let slot = &mut names[*position];
        match slot {
            Some(existing) if !existing.contains('.') => {}
            Some(_) if name.contains('.') => {}
            _ => *slot = Some(name),
        }
    }
    names
        .into_iter()
        .map(|name| name.cloned().unwrap_or_default())
        .collect()
}

/// An ordered list of column values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Field>,
}

impl From<Vec<Field>> for Row {
    fn from(values: Vec<Field>) -> Self {
        Row { values }
    }
}

impl From<Vec<&Field>> for Row {
    fn from(value: Vec<&Field>) -> Self {
        Row {
            values: value.into_iter().cloned().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl Row {
    pub fn iter(&self) -> Iter<Field> {
        self.values.iter()
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Field] {
        &self.values
    }

    pub fn get_field(&self, index: usize) -> Result<Field> {
        Ok(self.values.get(index).ok_or(Error::OutOfBounds)?.clone())
    }

    pub fn to_string(&self) -> String {
        self.values.iter().map(|field| field.to_string()).join(", ")
    }
}

/// A row in flight between tasks: the values, the shared column index of the
/// scan that produced them, the per-scan sequence number and, once a join key
/// task has seen it, the join key. Projected messages also carry their output
/// labels in position order, which may repeat a name.
#[derive(Debug, Clone)]
pub struct Message {
    id: u64,
    row: Row,
    col_index: Arc<ColumnIndex>,
    labels: Option<Arc<Vec<String>>>,
    key: Option<String>,
}

impl Message {
    pub fn new(id: u64, values: Vec<Field>, col_index: Arc<ColumnIndex>) -> Self {
        Self {
            id,
            row: Row::from(values),
            col_index,
            labels: None,
            key: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn values(&self) -> &[Field] {
        self.row.values()
    }

    pub fn into_row(self) -> Row {
        self.row
    }

    pub fn col_index(&self) -> &Arc<ColumnIndex> {
        &self.col_index
    }

    /// Replaces the column index, e.g. with a source-qualified one. The index
    /// must describe the same positions.
    pub fn with_col_index(mut self, col_index: Arc<ColumnIndex>) -> Self {
        self.col_index = col_index;
        self
    }

    pub fn with_labels(mut self, labels: Arc<Vec<String>>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn set_key(&mut self, key: String) {
        self.key = Some(key);
    }

    /// Looks up a column by name. A qualified name (`source.column`) falls
    /// back to the bare column name when the index has no qualified entry.
    pub fn get(&self, name: &str) -> Option<&Field> {
        let position = self.col_index.get(name).or_else(|| {
            name.split_once('.')
                .and_then(|(_, column)| self.col_index.get(column))
        })?;
        self.row.values.get(*position)
    }

    /// Positional column names of this message.
    pub fn column_names(&self) -> Vec<String> {
        match &self.labels {
            Some(labels) => labels.as_ref().clone(),
            None => column_names(&self.col_index),
        }
    }
}
