use crate::common::{Error, Result};
use crate::config::{EngineConfig, SourceConfig};
use crate::datasource::{Registry, Schema};
use crate::sql::ast::{Create, CreateKind};
use crate::sql::execution::task::{TaskBase, TaskRunner};
use crate::sql::execution::Context;
use crate::sql::planner::PlanTask;
use log::{info, warn};
use std::sync::Arc;

/// Executes a CREATE statement. Only sources can be created: the WITH block
/// is decoded into a source configuration, handed to the implementation's
/// setup hook and registered in a new schema of the statement's name.
pub struct CreateTask {
    base: TaskBase,
    stmt: Create,
    registry: Arc<Registry>,
}

impl CreateTask {
    pub fn new(stmt: Create, registry: Arc<Registry>, conf: &EngineConfig) -> Self {
        Self {
            base: TaskBase::new("Create", conf),
            stmt,
            registry,
        }
    }

    fn create(&self) -> Result<()> {
        match self.stmt.kind {
            CreateKind::Source => self.create_source(),
            kind => Err(Error::NotImplemented(format!("CREATE {kind:?}"))),
        }
    }

    fn create_source(&self) -> Result<()> {
        let with = serde_json::Value::Object(self.stmt.with.clone());
        let mut conf: SourceConfig = serde_json::from_value(with).map_err(|err| {
            Error::Config(format!("invalid source config for {}: {err}", self.stmt.identity))
        })?;
        conf.name = self.stmt.identity.clone();

        let Some(data_source) = self.registry.source_type(&conf.source_type)? else {
            warn!(
                "could not find source type {:?} for {}",
                conf.source_type, conf.name
            );
            return Ok(());
        };
        data_source.setup(&conf)?;
        self.registry.schema_add(Schema::new(&conf.name))?;
        info!("created source {} of type {}", conf.name, conf.source_type);
        let schema = conf.name.clone();
        self.registry.source_schema_add(&schema, conf, data_source)
    }
}

impl TaskRunner for CreateTask {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        let result = ctx.recover(self.base.task_type(), || self.create());
        self.base.close_output();
        result
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Create {
            identity: self.stmt.identity.clone(),
        }
    }
}
