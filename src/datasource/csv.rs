use crate::common::{Error, Result};
use crate::config::{EngineConfig, SourceConfig};
use crate::datasource::message::{build_column_index, ColumnIndex, Message};
use crate::datasource::{ColumnLister, DataSource, Scanner, SourceConn};
use crate::types::field::Field;
use ::csv::{Reader, ReaderBuilder, StringRecord};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Connection info that makes the csv source read standard input.
pub const STDIN: &str = "stdin";

/// Serves delimited text files. Named sources are configured with a `path`
/// setting; any other connection info is treated as a file path itself.
pub struct CsvDataSource {
    delimiter: u8,
    files: RwLock<HashMap<String, PathBuf>>,
}

impl CsvDataSource {
    pub fn new(conf: &EngineConfig) -> Result<Self> {
        Ok(Self {
            delimiter: conf.delimiter()?,
            files: RwLock::new(HashMap::new()),
        })
    }

    fn resolve(&self, conn_info: &str) -> Result<Option<PathBuf>> {
        if conn_info.eq_ignore_ascii_case(STDIN) {
            return Ok(None);
        }
        let files = self.files.read()?;
        match files.get(&conn_info.to_lowercase()) {
            Some(path) if path.as_os_str().eq_ignore_ascii_case(STDIN) => Ok(None),
            Some(path) => Ok(Some(path.clone())),
            None => Ok(Some(PathBuf::from(conn_info))),
        }
    }
}

impl DataSource for CsvDataSource {
    fn tables(&self) -> Vec<String> {
        match self.files.read() {
            Ok(files) => {
                let mut tables: Vec<String> = files.keys().cloned().collect();
                tables.sort();
                tables
            }
            Err(_) => Vec::new(),
        }
    }

    fn open(&self, conn_info: &str) -> Result<Box<dyn SourceConn>> {
        let input: Box<dyn Read + Send> = match self.resolve(conn_info)? {
            None => Box::new(std::io::stdin()),
            Some(path) => {
                debug!("opening csv file {}", path.display());
                Box::new(File::open(&path).map_err(|err| {
                    Error::Config(format!("could not open {}: {err}", path.display()))
                })?)
            }
        };
        Ok(Box::new(CsvConn::new(conn_info, input, self.delimiter)?))
    }

    fn setup(&self, conf: &SourceConfig) -> Result<()> {
        let Some(path) = conf.setting("path").or_else(|| conf.setting("file")) else {
            return Err(Error::Config(format!(
                "csv source {} needs a path setting",
                conf.name
            )));
        };
        info!("csv source {} reads {path}", conf.name);
        self.files
            .write()?
            .insert(conf.name.to_lowercase(), PathBuf::from(path));
        Ok(())
    }
}

/// A forward-only scan over one csv input. The first record is the header.
pub struct CsvConn {
    table: String,
    reader: Option<Reader<Box<dyn Read + Send>>>,
    columns: Vec<String>,
    col_index: Arc<ColumnIndex>,
    row_count: u64,
}

impl CsvConn {
    pub fn new(table: &str, input: Box<dyn Read + Send>, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(input);
        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        let col_index = Arc::new(build_column_index(&columns));
        Ok(Self {
            table: table.to_string(),
            reader: Some(reader),
            columns,
            col_index,
            row_count: 0,
        })
    }
}

impl SourceConn for CsvConn {
    fn scanner(&mut self) -> Option<&mut dyn Scanner> {
        Some(self)
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        Some(self)
    }

    fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!("closed csv {} after {} rows", self.table, self.row_count);
        }
        Ok(())
    }
}

impl ColumnLister for CsvConn {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }
}

impl Scanner for CsvConn {
    fn next(&mut self) -> Result<Option<Message>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut record = StringRecord::new();
        loop {
            match reader.read_record(&mut record) {
                Ok(false) => return Ok(None),
                Ok(true) if record.len() != self.columns.len() => {
                    warn!(
                        "dropping row of {}: has {} fields, want {}",
                        self.table,
                        record.len(),
                        self.columns.len()
                    );
                }
                Ok(true) => {
                    self.row_count += 1;
                    let values = record.iter().map(Field::from).collect();
                    return Ok(Some(Message::new(
                        self.row_count,
                        values,
                        self.col_index.clone(),
                    )));
                }
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => warn!("could not read row of {}: {err}", self.table),
            }
        }
    }
}
