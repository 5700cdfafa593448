//! Task graph execution: the task runner, its stages and composites, and the
//! job builder compiling statements into graphs of them.
mod composite;
mod context;
mod ddl;
mod job;
mod join;
mod select;
mod source;
mod task;
mod transform;

#[cfg(test)]
mod tests;

pub use composite::{Parallel, Sequential};
pub use context::Context;
pub use ddl::CreateTask;
pub use job::{Job, JobBuilder, JobCanceller};
pub use join::{join_key, JoinKey, JoinNaiveMerge};
pub use source::{Source, SourceJoin, TaskStepper};
pub use task::{
    make_handler, BoxedTask, Emitter, MessageHandler, MessageReceiver, MessageSender, SigSender,
    TaskBase, TaskRunner, Tasks,
};
pub use transform::{Projection, Where};
