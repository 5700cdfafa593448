use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::sql::execution::task::{
    BoxedTask, MessageReceiver, SigSender, TaskBase, TaskRunner, Tasks,
};
use crate::sql::execution::Context;
use crate::sql::planner::PlanTask;
use crossbeam::channel::{self, select};
use log::{debug, error};

/// Runs every child on its own scoped thread and waits for all of them. A
/// signal sent to the composite, or the failure of any child, is forwarded
/// to every child so no sibling stays blocked on a dead neighbour. Returns
/// the first child error in child order.
fn run_children(base: &TaskBase, tasks: &mut Tasks, ctx: &Context) -> Result<()> {
    let signals: Vec<SigSender> = tasks.iter().map(|t| t.sig_chan()).collect();
    let sig_rx = base.sig_receiver();
    let (done_tx, done_rx) = channel::bounded::<()>(0);
    let (fail_tx, fail_rx) = channel::unbounded::<()>();

    let results = crossbeam::scope(|s| {
        s.spawn(move |_| {
            select! {
                recv(sig_rx) -> _ => debug!("forwarding signal to {} children", signals.len()),
                recv(fail_rx) -> _ => debug!("stopping {} children after a failure", signals.len()),
                recv(done_rx) -> _ => return,
            }
            for signal in &signals {
                let _ = signal.try_send(true);
            }
        });
        let handles: Vec<_> = tasks
            .iter_mut()
            .map(|task| {
                let fail_tx = fail_tx.clone();
                s.spawn(move |_| {
                    let result = task.run(ctx);
                    if result.is_err() {
                        let _ = fail_tx.send(());
                    }
                    result
                })
            })
            .collect();
        let results: Vec<Result<()>> = handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(Error::Runtime("task thread panicked".to_string())))
            })
            .collect();
        drop(done_tx);
        results
    })
    .map_err(|_| Error::Runtime(format!("{} could not join its tasks", base.task_type())))?;

    match results.into_iter().find(|r| r.is_err()) {
        Some(Err(err)) => {
            error!("{} failed: {err}", base.task_type());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Closes every child. Close failures are logged, never returned.
fn close_children(tasks: &mut Tasks) {
    for task in tasks.iter_mut() {
        if let Err(err) = task.close() {
            log::warn!("could not close {}: {err}", task.task_type());
        }
    }
}

/// Children wired output to input in chain order. The output of the chain is
/// the output of its last child.
pub struct Sequential {
    base: TaskBase,
    name: String,
    tasks: Tasks,
}

impl Sequential {
    pub fn new(name: &str, tasks: Tasks, conf: &EngineConfig) -> Self {
        Self {
            base: TaskBase::new("Sequential", conf),
            name: name.to_string(),
            tasks,
        }
    }

}

impl TaskRunner for Sequential {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn children(&self) -> &[BoxedTask] {
        &self.tasks
    }

    fn add(&mut self, task: BoxedTask) -> Result<()> {
        self.tasks.push(task);
        Ok(())
    }

    fn setup(&mut self, depth: usize) -> Result<()> {
        for i in 1..self.tasks.len() {
            let input = self.tasks[i - 1].message_out();
            self.tasks[i].set_message_in(input);
        }
        for task in self.tasks.iter_mut() {
            task.setup(depth + 1)?;
        }
        self.base.setup(depth)
    }

    fn message_in(&self) -> Option<MessageReceiver> {
        match self.tasks.first() {
            Some(first) => first.message_in(),
            None => self.base.message_in(),
        }
    }

    fn message_out(&self) -> MessageReceiver {
        match self.tasks.last() {
            Some(last) => last.message_out(),
            None => self.base.message_out(),
        }
    }

    fn set_message_in(&mut self, input: MessageReceiver) {
        match self.tasks.first_mut() {
            Some(first) => first.set_message_in(input),
            None => self.base.set_message_in(input),
        }
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        let result = run_children(&self.base, &mut self.tasks, ctx);
        self.base.close_output();
        result
    }

    fn close(&mut self) -> Result<()> {
        close_children(&mut self.tasks);
        self.base.close()
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Sequential {
            name: self.name.clone(),
            tasks: self.tasks.iter().map(|t| t.plan()).collect(),
        }
    }
}

/// Independent children run concurrently. Their outputs are consumed
/// directly by a later stage (e.g. a merge join); the composite's own output
/// carries nothing and closes once every child is done.
pub struct Parallel {
    base: TaskBase,
    name: String,
    tasks: Tasks,
}

impl Parallel {
    pub fn new(name: &str, tasks: Tasks, conf: &EngineConfig) -> Self {
        Self {
            base: TaskBase::new("Parallel", conf),
            name: name.to_string(),
            tasks,
        }
    }
}

impl TaskRunner for Parallel {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn children(&self) -> &[BoxedTask] {
        &self.tasks
    }

    fn add(&mut self, task: BoxedTask) -> Result<()> {
        self.tasks.push(task);
        Ok(())
    }

    fn setup(&mut self, depth: usize) -> Result<()> {
        for task in self.tasks.iter_mut() {
            task.setup(depth + 1)?;
        }
        self.base.setup(depth)
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        let result = run_children(&self.base, &mut self.tasks, ctx);
        self.base.close_output();
        result
    }

    fn close(&mut self) -> Result<()> {
        close_children(&mut self.tasks);
        self.base.close()
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Parallel {
            name: self.name.clone(),
            tasks: self.tasks.iter().map(|t| t.plan()).collect(),
        }
    }
}
