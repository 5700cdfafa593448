use crate::common::{Error, Result};
use crate::config::SourceConfig;
use crate::datasource::message::{build_column_index, ColumnIndex, Message};
use crate::datasource::{ColumnLister, DataSource, Scanner, SourceConn};
use crate::types::field::Field;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
struct MemTable {
    columns: Vec<String>,
    rows: Arc<Vec<Vec<Field>>>,
}

/// In-memory tables, mostly for tests and embedding. A connection scans a
/// snapshot of the rows taken when it was opened.
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) an empty table.
    pub fn create_table(&self, name: &str, columns: &[&str]) -> Result<()> {
        let table = MemTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Arc::new(Vec::new()),
        };
        self.tables.write()?.insert(name.to_lowercase(), table);
        Ok(())
    }

    /// Appends rows to a table.
    pub fn insert(&self, name: &str, rows: Vec<Vec<Field>>) -> Result<()> {
        let mut tables = self.tables.write()?;
        let table = tables
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| Error::InvalidInput(format!("no such table {name}")))?;
        Arc::make_mut(&mut table.rows).extend(rows);
        Ok(())
    }
}

impl DataSource for MemoryDataSource {
    fn tables(&self) -> Vec<String> {
        match self.tables.read() {
            Ok(tables) => {
                let mut names: Vec<String> = tables.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }

    fn open(&self, conn_info: &str) -> Result<Box<dyn SourceConn>> {
        let tables = self.tables.read()?;
        let table = tables
            .get(&conn_info.to_lowercase())
            .ok_or_else(|| Error::Config(format!("no such table {conn_info}")))?;
        Ok(Box::new(MemoryConn {
            table: conn_info.to_string(),
            col_index: Arc::new(build_column_index(&table.columns)),
            columns: table.columns.clone(),
            rows: table.rows.clone(),
            position: 0,
        }))
    }

    /// Creates the table named by the source, with the comma separated
    /// `columns` setting, unless it already exists.
    fn setup(&self, conf: &SourceConfig) -> Result<()> {
        let mut tables = self.tables.write()?;
        let name = conf.name.to_lowercase();
        if tables.contains_key(&name) {
            return Ok(());
        }
        let columns = conf
            .setting("columns")
            .map(|cols| cols.split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();
        debug!("memory source {name} with columns {columns:?}");
        tables.insert(
            name,
            MemTable {
                columns,
                rows: Arc::new(Vec::new()),
            },
        );
        Ok(())
    }
}

struct MemoryConn {
    table: String,
    columns: Vec<String>,
    col_index: Arc<ColumnIndex>,
    rows: Arc<Vec<Vec<Field>>>,
    position: usize,
}

impl SourceConn for MemoryConn {
    fn scanner(&mut self) -> Option<&mut dyn Scanner> {
        Some(self)
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        Some(self)
    }

    fn close(&mut self) -> Result<()> {
        self.position = self.rows.len();
        Ok(())
    }
}

impl ColumnLister for MemoryConn {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }
}

impl Scanner for MemoryConn {
    fn next(&mut self) -> Result<Option<Message>> {
        while let Some(values) = self.rows.get(self.position) {
            self.position += 1;
            if values.len() != self.columns.len() {
                warn!(
                    "dropping row {} of {}: has {} fields, want {}",
                    self.position,
                    self.table,
                    values.len(),
                    self.columns.len()
                );
                continue;
            }
            return Ok(Some(Message::new(
                self.position as u64,
                values.clone(),
                self.col_index.clone(),
            )));
        }
        Ok(None)
    }
}
