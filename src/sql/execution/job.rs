use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::{Message, Registry};
use crate::sql::ast::{Create, Select};
use crate::sql::execution::ddl::CreateTask;
use crate::sql::execution::task::{BoxedTask, MessageReceiver, SigSender, TaskRunner};
use crate::sql::execution::Context;
use crate::sql::planner::{PlanTask, VisitStatus, Visitor};
use crate::types::Projection;
use log::{debug, info};
use std::sync::Arc;

/// Compiles statements into task graphs.
pub struct JobBuilder {
    pub(super) schema: String,
    pub(super) registry: Arc<Registry>,
    pub(super) conf: EngineConfig,
    /// The output description of the compiled statement.
    pub(super) projection: Option<Projection>,
}

impl JobBuilder {
    pub fn new(schema: &str, registry: Arc<Registry>, conf: &EngineConfig) -> Self {
        Self {
            schema: schema.to_string(),
            registry,
            conf: conf.clone(),
            projection: None,
        }
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    /// Packages a compiled root task as a runnable job.
    pub fn into_job(self, root: BoxedTask, status: VisitStatus) -> Job {
        Job::new(root, self.projection, Context::new(&self.schema), status)
    }
}

impl Visitor for JobBuilder {
    type Output = BoxedTask;

    fn visit_select(&mut self, stmt: &mut Select) -> Result<(BoxedTask, VisitStatus)> {
        self.build_select(stmt)
    }

    fn visit_create(&mut self, stmt: &mut Create) -> Result<(BoxedTask, VisitStatus)> {
        let task = CreateTask::new(stmt.clone(), self.registry.clone(), &self.conf);
        Ok((Box::new(task), VisitStatus::Continue))
    }
}

/// Stops every task of a job.
#[derive(Clone)]
pub struct JobCanceller {
    signals: Vec<SigSender>,
}

impl JobCanceller {
    pub fn cancel(&self) {
        debug!("cancelling {} tasks", self.signals.len());
        for signal in &self.signals {
            let _ = signal.try_send(true);
        }
    }
}

fn collect_signals(task: &dyn TaskRunner, signals: &mut Vec<SigSender>) {
    signals.push(task.sig_chan());
    for child in task.children() {
        collect_signals(child.as_ref(), signals);
    }
}

/// A compiled statement: the root task, its output description and the
/// context it runs with.
pub struct Job {
    root: BoxedTask,
    projection: Option<Projection>,
    ctx: Context,
    status: VisitStatus,
    setup: bool,
    closed: bool,
}

impl Job {
    pub fn new(root: BoxedTask, projection: Option<Projection>, ctx: Context, status: VisitStatus) -> Self {
        Self {
            root,
            projection,
            ctx,
            status,
            setup: false,
            closed: false,
        }
    }

    pub fn root(&self) -> &dyn TaskRunner {
        self.root.as_ref()
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn status(&self) -> VisitStatus {
        self.status
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn plan(&self) -> PlanTask {
        self.root.plan()
    }

    /// Sets up the whole graph top-down. Only the first call has an effect.
    pub fn setup(&mut self) -> Result<()> {
        if !self.setup {
            self.root.setup(0)?;
            self.setup = true;
        }
        Ok(())
    }

    pub fn message_out(&self) -> MessageReceiver {
        self.root.message_out()
    }

    pub fn cancel_handle(&self) -> JobCanceller {
        let mut signals = Vec::new();
        collect_signals(self.root.as_ref(), &mut signals);
        JobCanceller { signals }
    }

    /// Runs the graph on the calling thread. The caller must drain
    /// `message_out` concurrently, or the job stalls on a full channel.
    pub fn run(&mut self) -> Result<()> {
        self.setup()?;
        let result = self.root.run(&self.ctx);
        self.first_error(result)
    }

    /// Runs the graph and gathers every output message.
    pub fn collect(&mut self) -> Result<Vec<Message>> {
        self.setup()?;
        let out = self.root.message_out();
        let Self { root, ctx, .. } = self;
        let (result, rows) = crossbeam::scope(|s| {
            let handle = s.spawn(move |_| root.run(ctx));
            let rows: Vec<Message> = out.iter().collect();
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(Error::Runtime("job thread panicked".to_string())));
            (result, rows)
        })
        .map_err(|_| Error::Runtime("could not join job".to_string()))?;
        self.first_error(result)?;
        info!("job produced {} rows", rows.len());
        Ok(rows)
    }

    fn first_error(&self, result: Result<()>) -> Result<()> {
        result?;
        match self.ctx.errors().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Releases every task. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.root.close()
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("could not close job: {err}");
        }
    }
}
