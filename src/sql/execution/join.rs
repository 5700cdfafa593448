use crate::common::constants::JOIN_KEY_SEPARATOR;
use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::{ColumnIndex, Message};
use crate::sql::execution::task::{MessageReceiver, TaskBase, TaskRunner};
use crate::sql::execution::Context;
use crate::sql::planner::PlanTask;
use crossbeam::channel::select;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// The join key of a message: the values of the key columns joined by a
/// separator that can't occur in text values. No key columns give the empty
/// key, which matches every other empty key (a cross join).
pub fn join_key(msg: &Message, columns: &[String]) -> Result<String> {
    let values = columns
        .iter()
        .map(|column| {
            msg.get(column)
                .map(|value| value.to_string())
                .ok_or_else(|| Error::Runtime(format!("join column {column} not found")))
        })
        .collect::<Result<Vec<String>>>()?;
    Ok(values.join(&JOIN_KEY_SEPARATOR.to_string()))
}

/// Attaches the join key to every message.
pub struct JoinKey {
    base: TaskBase,
    from: String,
    columns: Vec<String>,
}

impl JoinKey {
    pub fn new(from: &str, columns: Vec<String>, conf: &EngineConfig) -> Self {
        let mut base = TaskBase::new("JoinKey", conf);
        let emitter = base.emitter();
        let err_tx = base.err_chan();
        let key_columns = columns.clone();
        base.set_handler(Box::new(move |_ctx, mut msg| {
            match join_key(&msg, &key_columns) {
                Ok(key) => {
                    msg.set_key(key);
                    emitter.emit(msg)
                }
                Err(err) => {
                    let _ = err_tx.try_send(err);
                    false
                }
            }
        }));
        Self {
            base,
            from: from.to_string(),
            columns,
        }
    }
}

impl TaskRunner for JoinKey {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        self.base.run(ctx)
    }

    fn plan(&self) -> PlanTask {
        PlanTask::JoinKey {
            from: self.from.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// Joins two keyed streams on key equality. The right input is the build
/// side: it is drained into a hash table first. The left input then probes
/// it, so output follows the left side's arrival order. The task's own input
/// channel is not read.
pub struct JoinNaiveMerge {
    base: TaskBase,
    left_name: String,
    right_name: String,
    left: MessageReceiver,
    right: MessageReceiver,
}

impl JoinNaiveMerge {
    pub fn new(
        left_name: &str,
        left: &dyn TaskRunner,
        right_name: &str,
        right: &dyn TaskRunner,
        conf: &EngineConfig,
    ) -> Self {
        Self {
            base: TaskBase::new("JoinNaiveMerge", conf),
            left_name: left_name.to_string(),
            right_name: right_name.to_string(),
            left: left.message_out(),
            right: right.message_out(),
        }
    }

    /// Receives the next message of an input, unless the task was signalled.
    fn receive(&self, input: &MessageReceiver) -> Result<Received> {
        if let Some(result) = self.base.poll() {
            result?;
            return Ok(Received::Stopped);
        }
        let sig = self.base.sig_receiver();
        select! {
            recv(input) -> msg => Ok(msg.map_or(Received::Closed, Received::Message)),
            recv(sig) -> _ => Ok(Received::Stopped),
        }
    }

    fn merge(&self) -> Result<()> {
        let mut build: HashMap<String, Vec<Message>> = HashMap::new();
        loop {
            match self.receive(&self.right)? {
                Received::Message(msg) => {
                    let key = msg.key().unwrap_or_default().to_string();
                    build.entry(key).or_default().push(msg);
                }
                Received::Closed => break,
                Received::Stopped => return self.base.pending_error(),
            }
        }
        debug!(
            "{} built {} keys from {}",
            self.base.task_type(),
            build.len(),
            self.right_name
        );

        let emitter = self.base.emitter();
        let mut merged = MergedIndex::default();
        let mut id = 0;
        loop {
            let left = match self.receive(&self.left)? {
                Received::Message(msg) => msg,
                Received::Closed => break,
                Received::Stopped => return self.base.pending_error(),
            };
            let Some(matches) = build.get(left.key().unwrap_or_default()) else {
                continue;
            };
            for right in matches {
                id += 1;
                let mut values = left.values().to_vec();
                values.extend_from_slice(right.values());
                let col_index = merged.get(&left, right);
                if !emitter.emit(Message::new(id, values, col_index)) {
                    return self.base.pending_error();
                }
            }
        }
        debug!("{} emitted {id} rows", self.base.task_type());
        self.base.pending_error()
    }
}

enum Received {
    Message(Message),
    Closed,
    Stopped,
}

/// The column index of merged rows, built once per pair of input indexes.
#[derive(Default)]
struct MergedIndex {
    inputs: Option<(Arc<ColumnIndex>, Arc<ColumnIndex>)>,
    merged: Arc<ColumnIndex>,
}

impl MergedIndex {
    fn get(&mut self, left: &Message, right: &Message) -> Arc<ColumnIndex> {
        let cached = matches!(&self.inputs, Some((l, r))
            if Arc::ptr_eq(l, left.col_index()) && Arc::ptr_eq(r, right.col_index()));
        if !cached {
            let offset = left.values().len();
            let mut index = left.col_index().as_ref().clone();
            for (name, position) in right.col_index().iter() {
                // left wins for names both sides share
                index.entry(name.clone()).or_insert(position + offset);
            }
            self.inputs = Some((left.col_index().clone(), right.col_index().clone()));
            self.merged = Arc::new(index);
        }
        self.merged.clone()
    }
}

impl TaskRunner for JoinNaiveMerge {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, ctx: &Context) -> Result<()> {
        let result = ctx.recover(self.base.task_type(), || self.merge());
        self.base.close_output();
        result
    }

    fn plan(&self) -> PlanTask {
        PlanTask::JoinMerge {
            left: self.left_name.clone(),
            right: self.right_name.clone(),
        }
    }
}
