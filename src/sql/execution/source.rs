use crate::common::constants::MUST_IMPLEMENT_SCANNER_MSG;
use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::{qualify_column_index, ColumnIndex, Message, SourceConn};
use crate::sql::ast::FromClause;
use crate::sql::execution::join::join_key;
use crate::sql::execution::task::{TaskBase, TaskRunner};
use crate::sql::execution::Context;
use crate::sql::planner::PlanTask;
use log::{debug, warn};
use std::sync::Arc;

/// Pulls rows from a scanner and pushes them downstream, passing each through
/// `decorate` first. Read errors are recorded and end the scan.
fn scan(
    base: &TaskBase,
    conn: &mut dyn SourceConn,
    mut decorate: impl FnMut(Message) -> Result<Message>,
) -> Result<()> {
    let scanner = conn
        .scanner()
        .ok_or_else(|| Error::Plan(MUST_IMPLEMENT_SCANNER_MSG.to_string()))?;
    let emitter = base.emitter();
    let mut count = 0;
    loop {
        if let Some(result) = base.poll() {
            return result;
        }
        match scanner
            .next()
            .and_then(|msg| msg.map(&mut decorate).transpose())
        {
            Ok(Some(msg)) => {
                if !emitter.emit(msg) {
                    break;
                }
                count += 1;
            }
            Ok(None) => break,
            Err(err) => base.record_error(Error::Runtime(err.to_string())),
        }
    }
    debug!("{} emitted {count} rows", base.task_type());
    base.pending_error()
}

fn close_conn(task_type: &str, conn: &mut dyn SourceConn) {
    if let Err(err) = conn.close() {
        warn!("{task_type} could not close source: {err}");
    }
}

/// A plain streaming scan of one source.
pub struct Source {
    base: TaskBase,
    from: Option<String>,
    conn: Box<dyn SourceConn>,
}

impl Source {
    pub fn new(from: Option<&FromClause>, conn: Box<dyn SourceConn>, conf: &EngineConfig) -> Self {
        Self {
            base: TaskBase::new("Source", conf),
            from: from.map(|f| f.source_name().to_string()),
            conn,
        }
    }
}

impl TaskRunner for Source {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        let Self { base, conn, .. } = self;
        let result = ctx.recover(base.task_type(), || scan(base, conn.as_mut(), Ok));
        self.base.close_output();
        result
    }

    fn close(&mut self) -> Result<()> {
        close_conn(self.base.task_type(), self.conn.as_mut());
        self.base.close()
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Source {
            from: self.from.clone(),
        }
    }
}

/// A scan of a source taking part in a join: rows are re-indexed so columns
/// can also be addressed as `qualifier.column`, and carry their join key.
pub struct SourceJoin {
    base: TaskBase,
    from: String,
    conn: Box<dyn SourceConn>,
    col_index: Arc<ColumnIndex>,
    join_columns: Vec<String>,
}

impl SourceJoin {
    /// The FROM clause's column index must already be built.
    pub fn new(from: &FromClause, conn: Box<dyn SourceConn>, conf: &EngineConfig) -> Result<Self> {
        let index = from.col_index.as_ref().ok_or_else(|| {
            Error::Plan(format!("no column index for {}", from.source_name()))
        })?;
        Ok(Self {
            base: TaskBase::new("SourceJoin", conf),
            from: from.qualifier().to_string(),
            conn,
            col_index: Arc::new(qualify_column_index(index, from.qualifier())),
            join_columns: from.join_columns.clone(),
        })
    }
}

impl TaskRunner for SourceJoin {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        let Self {
            base,
            conn,
            col_index,
            join_columns,
            ..
        } = self;
        let result = ctx.recover(base.task_type(), || {
            scan(base, conn.as_mut(), |msg| {
                let mut msg = msg.with_col_index(col_index.clone());
                msg.set_key(join_key(&msg, join_columns)?);
                Ok(msg)
            })
        });
        self.base.close_output();
        result
    }

    fn close(&mut self) -> Result<()> {
        close_conn(self.base.task_type(), self.conn.as_mut());
        self.base.close()
    }

    fn plan(&self) -> PlanTask {
        PlanTask::SourceJoin {
            from: self.from.clone(),
            join_columns: self.join_columns.clone(),
        }
    }
}

/// Caller-driven iteration over a source. `next` never waits on a data
/// channel; `run` only waits for the cancellation signal.
pub struct TaskStepper {
    base: TaskBase,
    from: Option<String>,
    conn: Box<dyn SourceConn>,
    done: bool,
}

impl TaskStepper {
    pub fn new(from: Option<&FromClause>, conn: Box<dyn SourceConn>, conf: &EngineConfig) -> Self {
        Self {
            base: TaskBase::new("TaskStepper", conf),
            from: from.map(|f| f.source_name().to_string()),
            conn,
            done: false,
        }
    }

    /// The next row, or None once the source is exhausted or the stepper was
    /// signalled.
    pub fn next(&mut self) -> Result<Option<Message>> {
        if self.done {
            return Ok(None);
        }
        if let Some(result) = self.base.poll() {
            self.done = true;
            result?;
            return Ok(None);
        }
        let scanner = self
            .conn
            .scanner()
            .ok_or_else(|| Error::Plan(MUST_IMPLEMENT_SCANNER_MSG.to_string()))?;
        let next = scanner.next()?;
        if next.is_none() {
            self.done = true;
        }
        Ok(next)
    }
}

impl TaskRunner for TaskStepper {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, _ctx: &Context) -> Result<()> {
        let signal = self.base.sig_receiver();
        if !self.done {
            // rows are pulled through next(); nothing flows on the channels
            let _ = signal.recv();
            self.done = true;
        }
        self.base.close_output();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.done = true;
        close_conn(self.base.task_type(), self.conn.as_mut());
        self.base.close()
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Stepper {
            from: self.from.clone(),
        }
    }
}
