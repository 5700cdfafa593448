use crate::common::{Error, Result};
use crate::config::EngineConfig;
use crate::datasource::{build_column_index, ColumnIndex, Message};
use crate::sql::ast::ResultColumn;
use crate::sql::execution::task::{Emitter, TaskBase, TaskRunner};
use crate::sql::execution::Context;
use crate::sql::planner::{Expression, PlanTask};
use crate::types::field::Field;
use crate::types::{Column, DataType, Projection as ProjectionSchema};
use crossbeam::channel::Sender;
use std::sync::Arc;

/// Drops messages for which the predicate isn't true. NULL counts as false.
pub struct Where {
    base: TaskBase,
    predicate: Expression,
}

impl Where {
    pub fn new(predicate: Expression, conf: &EngineConfig) -> Self {
        let mut base = TaskBase::new("Where", conf);
        let emitter = base.emitter();
        let err_tx = base.err_chan();
        let filter = predicate.clone();
        base.set_handler(Box::new(move |_ctx, msg| {
            match filter.evaluate(Some(&msg)).and_then(|v| v.truthy()) {
                Ok(Some(true)) => emitter.emit(msg),
                Ok(_) => true,
                Err(err) => {
                    let _ = err_tx.try_send(err);
                    false
                }
            }
        }));
        Self { base, predicate }
    }
}

impl TaskRunner for Where {
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
        PlanTask::Where {
            predicate: self.predicate.clone(),
        }
    }
}

/// Maps every message onto the declared output columns. `*` expands to all
/// columns of the input in position order.
pub struct Projection {
    base: TaskBase,
    columns: Vec<ResultColumn>,
    types: Vec<DataType>,
}

impl Projection {
    /// The final projection of a statement's result columns.
    pub fn new(columns: Vec<ResultColumn>, conf: &EngineConfig) -> Self {
        let types = vec![DataType::Unknown; columns.len()];
        Self::build(columns, types, conf)
    }

    /// A projection with declared column types, as used for constant results.
    pub fn typed(schema: &ProjectionSchema, conf: &EngineConfig) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| ResultColumn::column(&c.label().to_string()))
            .collect();
        let types = schema.columns().iter().map(|c| c.data_type()).collect();
        Self::build(columns, types, conf)
    }

    fn build(columns: Vec<ResultColumn>, types: Vec<DataType>, conf: &EngineConfig) -> Self {
        let mut base = TaskBase::new("Projection", conf);
        let mut projector = Projector::new(columns.clone(), base.emitter(), base.err_chan());
        base.set_handler(Box::new(move |_ctx, msg| projector.project(msg)));
        Self {
            base,
            columns,
            types,
        }
    }

    /// The output columns as far as they are known before any row is seen.
    pub fn schema(&self) -> ProjectionSchema {
        self.columns
            .iter()
            .zip(&self.types)
            .map(|(col, data_type)| Column::new(&col.output_name(), *data_type))
            .collect::<Vec<_>>()
            .into()
    }
}

type OutputColumns = (Arc<ColumnIndex>, Arc<Vec<String>>);

struct Projector {
    columns: Vec<ResultColumn>,
    emitter: Emitter,
    err_tx: Sender<Error>,
    /// Output index and labels, computed from the first message's input index.
    index: Option<(Arc<ColumnIndex>, OutputColumns)>,
}

impl Projector {
    fn new(columns: Vec<ResultColumn>, emitter: Emitter, err_tx: Sender<Error>) -> Self {
        Self {
            columns,
            emitter,
            err_tx,
            index: None,
        }
    }

    fn project(&mut self, msg: Message) -> bool {
        match self.values(&msg) {
            Ok(values) => {
                let (index, labels) = self.output_columns(&msg);
                self.emitter
                    .emit(Message::new(msg.id(), values, index).with_labels(labels))
            }
            Err(err) => {
                let _ = self.err_tx.try_send(err);
                false
            }
        }
    }

    fn values(&self, msg: &Message) -> Result<Vec<Field>> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            match column {
                ResultColumn::Star => values.extend_from_slice(msg.values()),
                ResultColumn::Expr { expr, .. } => values.push(expr.evaluate(Some(msg))?),
            }
        }
        Ok(values)
    }

    fn output_columns(&mut self, msg: &Message) -> OutputColumns {
        if let Some((input, output)) = &self.index {
            if Arc::ptr_eq(input, msg.col_index()) {
                return output.clone();
            }
        }
        let names: Vec<String> = self
            .columns
            .iter()
            .flat_map(|column| match column {
                ResultColumn::Star => msg.column_names(),
                column => vec![column.output_name()],
            })
            .collect();
        let output = (Arc::new(build_column_index(&names)), Arc::new(names));
        self.index = Some((msg.col_index().clone(), output.clone()));
        output
    }
}

impl TaskRunner for Projection {
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
        PlanTask::Projection {
            columns: self.schema().columns().to_vec(),
        }
    }
}
