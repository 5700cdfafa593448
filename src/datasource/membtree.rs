use crate::common::Result;
use crate::datasource::message::{build_column_index, ColumnIndex, Message};
use crate::datasource::{ColumnLister, DataSource, Scanner, SourceConn};
use crate::types::field::Field;
use std::sync::Arc;

/// A single-row, single-column in-memory source, used to answer system
/// variable and `database()` queries.
#[derive(Clone, Debug)]
pub struct StaticDataValue {
    name: String,
    value: Field,
    col_index: Arc<ColumnIndex>,
    done: bool,
}

impl StaticDataValue {
    pub fn new(name: &str, value: Field) -> Self {
        Self {
            name: name.to_string(),
            value,
            col_index: Arc::new(build_column_index(&[name.to_string()])),
            done: false,
        }
    }
}

impl DataSource for StaticDataValue {
    fn tables(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn open(&self, _conn_info: &str) -> Result<Box<dyn SourceConn>> {
        Ok(Box::new(Self::new(&self.name, self.value.clone())))
    }
}

impl SourceConn for StaticDataValue {
    fn scanner(&mut self) -> Option<&mut dyn Scanner> {
        Some(self)
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        Some(self)
    }

    fn close(&mut self) -> Result<()> {
        self.done = true;
        Ok(())
    }
}

impl ColumnLister for StaticDataValue {
    fn columns(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

impl Scanner for StaticDataValue {
    fn next(&mut self) -> Result<Option<Message>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        Ok(Some(Message::new(
            1,
            vec![self.value.clone()],
            self.col_index.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_exactly_one_row() {
        let mut value = StaticDataValue::new("@@max_allowed_packet", Field::from(1048576));
        let msg = value.next().unwrap().unwrap();
        assert_eq!(msg.get("@@max_allowed_packet"), Some(&Field::Integer(1048576)));
        assert!(value.next().unwrap().is_none());
    }

    #[test]
    fn test_open_restarts_scan() {
        let mut value = StaticDataValue::new("database", Field::from("shop"));
        while value.next().unwrap().is_some() {}
        let mut conn = value.open("database").unwrap();
        assert!(conn.scanner().unwrap().next().unwrap().is_some());
        assert_eq!(conn.column_lister().unwrap().columns(), vec!["database"]);
    }
}
