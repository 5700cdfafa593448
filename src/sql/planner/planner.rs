use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::Registry;
use crate::sql::ast::{
    Command, Create, Delete, Describe, Insert, Prepared, Select, Show, Statement, Update, Upsert,
};
use crate::sql::execution::{Job, JobBuilder};
use crate::sql::planner::PlanTask;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Whether planning should continue with the caller's own steps, or the
/// returned result is the complete plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitStatus {
    Continue,
    Final,
}

fn not_implemented<T>(kind: &str) -> Result<T> {
    Err(Error::NotImplemented(format!("{kind} statements")))
}

/// Double dispatch over statement kinds. Only SELECT is mandatory; every
/// other kind reports not-implemented unless a visitor overrides it.
pub trait Visitor {
    type Output;

    fn visit_select(&mut self, stmt: &mut Select) -> Result<(Self::Output, VisitStatus)>;

    fn visit_insert(&mut self, _stmt: &mut Insert) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("INSERT")
    }

    fn visit_update(&mut self, _stmt: &mut Update) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("UPDATE")
    }

    fn visit_delete(&mut self, _stmt: &mut Delete) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("DELETE")
    }

    fn visit_upsert(&mut self, _stmt: &mut Upsert) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("UPSERT")
    }

    fn visit_show(&mut self, _stmt: &mut Show) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("SHOW")
    }

    fn visit_describe(&mut self, _stmt: &mut Describe) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("DESCRIBE")
    }

    fn visit_prepared(&mut self, _stmt: &mut Prepared) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("PREPARE")
    }

    fn visit_command(&mut self, _stmt: &mut Command) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("SET")
    }

    fn visit_create(&mut self, _stmt: &mut Create) -> Result<(Self::Output, VisitStatus)> {
        not_implemented("CREATE")
    }
}

/// Compiles a statement into a runnable [`Job`] and records the serializable
/// description of the compiled task graph.
pub struct Planner {
    schema: String,
    registry: Arc<Registry>,
    conf: EngineConfig,
    tasks: Vec<PlanTask>,
    job: Option<Job>,
}

impl Planner {
    /// Plans a statement against the sources of the registry.
    pub fn build(
        schema: &str,
        stmt: &mut Statement,
        registry: Arc<Registry>,
        conf: &EngineConfig,
    ) -> Result<(Planner, VisitStatus)> {
        let mut planner = Planner {
            schema: schema.to_string(),
            registry,
            conf: conf.clone(),
            tasks: Vec::new(),
            job: None,
        };
        let (plan, status) = stmt.accept(&mut planner)?;
        debug!("planned {} for {}:\n{plan}", stmt.keyword(), planner.schema);
        planner.tasks.push(plan);
        Ok((planner, status))
    }

    /// The recorded plan of the compiled statement.
    pub fn tasks(&self) -> &[PlanTask] {
        &self.tasks
    }

    pub fn into_job(self) -> Result<Job> {
        self.job
            .ok_or_else(|| Error::Plan("planner has no compiled job".to_string()))
    }

    fn builder(&self) -> JobBuilder {
        JobBuilder::new(&self.schema, self.registry.clone(), &self.conf)
    }
}

impl Visitor for Planner {
    type Output = PlanTask;

    fn visit_select(&mut self, stmt: &mut Select) -> Result<(PlanTask, VisitStatus)> {
        let mut builder = self.builder();
        let (task, status) = builder.visit_select(stmt)?;
        let plan = task.plan();
        self.job = Some(builder.into_job(task, status));
        Ok((plan, status))
    }

    fn visit_create(&mut self, stmt: &mut Create) -> Result<(PlanTask, VisitStatus)> {
        let mut builder = self.builder();
        let (task, status) = builder.visit_create(stmt)?;
        let plan = task.plan();
        self.job = Some(builder.into_job(task, status));
        Ok((plan, status))
    }
}
