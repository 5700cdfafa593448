use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::{Registry, Row};
use crate::sql::ast::Statement;
use crate::sql::planner::{PlanTask, Planner};
use crate::types::field::Label;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A session executes statements against the sources of a registry, within
/// one schema.
pub struct Session {
    registry: Arc<Registry>,
    schema: String,
    conf: EngineConfig,
}

impl Session {
    /// Creates a session on the default schema of the global configuration.
    pub fn new(registry: Arc<Registry>) -> Self {
        let conf = EngineConfig::global().clone();
        Self::with_schema(registry, &conf.default_schema, &conf)
    }

    pub fn with_schema(registry: Arc<Registry>, schema: &str, conf: &EngineConfig) -> Self {
        Self {
            registry,
            schema: schema.to_string(),
            conf: conf.clone(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Compiles a statement without running it.
    pub fn explain(&self, mut stmt: Statement) -> Result<PlanTask> {
        let (planner, _) = Planner::build(&self.schema, &mut stmt, self.registry.clone(), &self.conf)?;
        planner
            .tasks()
            .first()
            .cloned()
            .ok_or_else(|| Error::Plan("nothing was planned".to_string()))
    }

    /// Plans and runs a statement.
    pub fn execute(&mut self, mut stmt: Statement) -> Result<StatementResult> {
        let (planner, _) = Planner::build(&self.schema, &mut stmt, self.registry.clone(), &self.conf)?;
        let mut job = planner.into_job()?;
        let messages = job.collect()?;

        match stmt {
            Statement::Create(create) => {
                let registered = self.registry.get(&create.identity)?.is_some();
                Ok(StatementResult::CreateSource {
                    name: create.identity,
                    registered,
                })
            }
            Statement::Select(_) => {
                let columns = match messages.first() {
                    Some(msg) => msg.column_names().iter().map(|c| Label::parse(c)).collect(),
                    None => job.projection().map(|p| p.labels()).unwrap_or_default(),
                };
                let rows: Vec<Row> = messages.into_iter().map(|msg| msg.into_row()).collect();
                info!("{} rows selected", rows.len());
                Ok(StatementResult::Select { columns, rows })
            }
            stmt => Err(Error::NotImplemented(format!("{} statements", stmt.keyword()))),
        }
    }
}

/// The result of a session statement.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum StatementResult {
    CreateSource { name: String, registered: bool },
    Select { columns: Vec<Label>, rows: Vec<Row> },
}
