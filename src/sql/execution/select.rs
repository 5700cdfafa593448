use crate::common::constants::{
    CONNECTION_ID, CURRENT_USER, MAX_ALLOWED_PACKET, MUST_IMPLEMENT_COLUMNS_MSG,
    MUST_IMPLEMENT_SCANNER_MSG, UNSUPPORTED_WHERE_MSG, UTC_TIMEDIFF,
};
use crate::common::{Error, Result};
use crate::datasource::StaticDataValue;
use crate::errplan;
use crate::sql::ast::{FromClause, Select, Where as WhereClause};
use crate::sql::execution::composite::{Parallel, Sequential};
use crate::sql::execution::join::{JoinKey, JoinNaiveMerge};
use crate::sql::execution::source::{Source, SourceJoin};
use crate::sql::execution::task::{BoxedTask, Tasks};
use crate::sql::execution::transform::{Projection, Where};
use crate::sql::execution::JobBuilder;
use crate::sql::planner::VisitStatus;
use crate::types::field::Field;
use crate::types::{DataType, Projection as ProjectionSchema};
use log::{debug, error, info};
use once_cell::sync::OnceCell;
use regex::Regex;

static SYS_PUNCTUATION: OnceCell<Regex> = OnceCell::new();

/// Lower-cases a system expression and strips whitespace around parentheses
/// and commas, so `TIMEDIFF( CURTIME(), UTC_TIME() )` matches its table entry.
fn normalize_sys_variable(raw: &str) -> Result<String> {
    let pattern = SYS_PUNCTUATION
        .get_or_try_init(|| Regex::new(r"\s*([(),])\s*"))
        .map_err(|err| Error::Plan(err.to_string()))?;
    Ok(pattern.replace_all(raw.trim(), "$1").to_lowercase())
}

impl JobBuilder {
    pub(super) fn build_select(&mut self, stmt: &mut Select) -> Result<(BoxedTask, VisitStatus)> {
        match stmt.from.len() {
            0 if stmt.system_query() => self.visit_select_system_info(stmt),
            0 => {
                error!("select without FROM is not a system query");
                errplan!("no FROM clause and not a system query")
            }
            1 => {
                // the whole statement is pushed into the single source's sub-select
                let view = stmt.sub_statement();
                let from = &mut stmt.from[0];
                from.source = Some(Box::new(view));
                let (task, status) = self.visit_sub_select(from, false)?;
                if status == VisitStatus::Final {
                    info!("sub-select of {} is final", from.source_name());
                    return Ok((task, status));
                }
                let tasks: Tasks = vec![task, self.final_projection(stmt)];
                Ok((self.sequential("select", tasks), VisitStatus::Continue))
            }
            _ => {
                let filter = stmt
                    .where_clause
                    .as_ref()
                    .map(|w| self.where_task(w))
                    .transpose()?;
                let mut tasks = vec![self.fold_joins(stmt)?];
                tasks.extend(filter);
                tasks.push(self.final_projection(stmt));
                Ok((self.sequential("select", tasks), VisitStatus::Continue))
            }
        }
    }

    /// Joins the FROM clauses strictly in declaration order: each source is
    /// paired with everything joined so far and merged on its key.
    fn fold_joins(&mut self, stmt: &mut Select) -> Result<BoxedTask> {
        let view = stmt.clone();
        let first_keyed = !stmt.from[0].join_columns.is_empty();
        let mut joined: Option<(BoxedTask, String)> = None;

        for (i, from) in stmt.from.iter_mut().enumerate() {
            from.rewrite(&view);
            from.seekable = i > 0;
            let (task, status) = self.visit_sub_select(from, true)?;
            if status == VisitStatus::Final {
                debug!("using final sub-select of {} as join input", from.source_name());
            }
            let right_name = from.qualifier().to_string();

            joined = Some(match joined.take() {
                None => (task, right_name),
                Some((left, left_name)) => {
                    // the first source's own key only fits the second source
                    let keyed = i == 1
                        && first_keyed
                        && from.join_with.is_empty()
                        && !from.join_columns.is_empty();
                    let left = if keyed {
                        left
                    } else {
                        let key = JoinKey::new(&left_name, from.partner_columns().to_vec(), &self.conf);
                        self.sequential("join-left", vec![left, Box::new(key)])
                    };
                    let merge = JoinNaiveMerge::new(&left_name, &*left, &right_name, &*task, &self.conf);
                    let sources = Parallel::new("join-sources", vec![left, task], &self.conf);
                    let tasks: Tasks = vec![Box::new(sources), Box::new(merge)];
                    (self.sequential("join", tasks), format!("{left_name},{right_name}"))
                }
            });
        }
        joined
            .map(|(task, _)| task)
            .ok_or_else(|| Error::Plan("join without sources".to_string()))
    }

    /// Compiles the sub-select of one FROM clause. Rows of sources taking part
    /// in a join are qualified with the source's alias.
    pub(super) fn visit_sub_select(
        &mut self,
        from: &mut FromClause,
        in_join: bool,
    ) -> Result<(BoxedTask, VisitStatus)> {
        debug!("visit_sub_select {}", from.source_name());
        let features = self.registry.get(from.source_name())?.ok_or_else(|| {
            error!("could not find source for {}", from.source_name());
            Error::Config(format!("could not find source for {}", from.source_name()))
        })?;
        let mut conn = features.data_source.open(from.source_name())?;
        let needs_join_key = from.needs_join_key();

        if let Some(planner) = conn.self_planner() {
            let Some(mut visitor) = planner.sub_select_visitor()? else {
                return errplan!("no sub-select planner for {}", from.source_name());
            };
            let (task, status) = visitor.visit_sub_select(from)?;
            if status == VisitStatus::Final {
                let task = task.ok_or_else(|| {
                    Error::Plan(format!("{} planned no task", from.source_name()))
                })?;
                self.projection = planner.projection();
                if !needs_join_key {
                    return Ok((task, status));
                }
                let lister = visitor.column_lister().ok_or_else(|| {
                    Error::Plan(format!("{}: {MUST_IMPLEMENT_COLUMNS_MSG}", from.source_name()))
                })?;
                from.build_col_index(&lister.columns());
                let key = JoinKey::new(from.qualifier(), from.join_columns.clone(), &self.conf);
                return Ok((self.sequential("sub-select", vec![task, Box::new(key)]), status));
            }
            if let Some(task) = task {
                debug!("{} planned its own sub-select", from.source_name());
                return Ok((task, status));
            }
            error!("could not source plan for {}", from.source_name());
        }

        if conn.scanner().is_none() {
            error!("source {} has neither planner nor scanner", from.source_name());
            return errplan!("{}: {MUST_IMPLEMENT_SCANNER_MSG}", from.source_name());
        }
        if from.col_index.is_none() {
            let lister = conn.column_lister().ok_or_else(|| {
                Error::Plan(format!("{}: {MUST_IMPLEMENT_COLUMNS_MSG}", from.source_name()))
            })?;
            from.build_col_index(&lister.columns());
        }
        let filter = from
            .source
            .as_ref()
            .and_then(|sub| sub.where_clause.as_ref())
            .map(|w| self.where_task(w))
            .transpose()?;

        let mut tasks: Tasks = Vec::new();
        if needs_join_key || in_join {
            tasks.push(Box::new(SourceJoin::new(from, conn, &self.conf)?));
        } else {
            tasks.push(Box::new(Source::new(Some(&*from), conn, &self.conf)));
        }
        tasks.extend(filter);
        if needs_join_key {
            let key = JoinKey::new(from.qualifier(), from.join_columns.clone(), &self.conf);
            tasks.push(Box::new(key));
        }
        Ok((self.sequential("sub-select", tasks), VisitStatus::Continue))
    }

    fn where_task(&self, clause: &WhereClause) -> Result<BoxedTask> {
        match clause {
            WhereClause::Expr(predicate) => Ok(Box::new(Where::new(predicate.clone(), &self.conf))),
            WhereClause::SubQuery(_) => {
                error!("correlated sub-query in WHERE");
                errplan!("{UNSUPPORTED_WHERE_MSG}: sub-query")
            }
        }
    }

    fn final_projection(&mut self, stmt: &Select) -> BoxedTask {
        let projection = Projection::new(stmt.columns.clone(), &self.conf);
        self.projection = Some(projection.schema());
        Box::new(projection)
    }

    fn sequential(&self, name: &str, tasks: Tasks) -> BoxedTask {
        Box::new(Sequential::new(name, tasks, &self.conf))
    }

    fn visit_select_system_info(&mut self, stmt: &Select) -> Result<(BoxedTask, VisitStatus)> {
        if let Some(raw) = &stmt.sys_variable {
            return self.visit_sys_variable(raw);
        }
        if stmt.is_database_query() {
            let schema = Field::from(self.schema.as_str());
            return self.sys_value_tasks("database", schema);
        }
        errplan!("unrecognized system query")
    }

    fn visit_sys_variable(&mut self, raw: &str) -> Result<(BoxedTask, VisitStatus)> {
        let name = normalize_sys_variable(raw)?;
        match name.as_str() {
            "@@max_allowed_packet" => self.sys_value_tasks(&name, Field::Integer(MAX_ALLOWED_PACKET)),
            "current_user()" | "current_user" => self.sys_value_tasks(&name, Field::from(CURRENT_USER)),
            "connection_id()" => self.sys_value_tasks(&name, Field::Integer(CONNECTION_ID)),
            "timediff(curtime(),utc_time())" => {
                self.sys_value_tasks("timediff", Field::from(UTC_TIMEDIFF))
            }
            _ => {
                error!("unrecognized system variable {raw}");
                errplan!("Unrecognized System Variable: {raw}")
            }
        }
    }

    /// Serves a constant through a single-row static source and a typed
    /// projection.
    fn sys_value_tasks(&mut self, name: &str, value: Field) -> Result<(BoxedTask, VisitStatus)> {
        let data_type = match &value {
            Field::Integer(_) => DataType::Int,
            Field::String(_) => DataType::Text,
            Field::Float(_) => DataType::Float,
            Field::Boolean(_) => DataType::Bool,
            Field::Null => return errplan!("Unrecognized Data Type: {value}"),
        };
        let mut schema = ProjectionSchema::new();
        schema.add_column(name, data_type);

        let source = Source::new(None, Box::new(StaticDataValue::new(name, value)), &self.conf);
        let projection = Projection::typed(&schema, &self.conf);
        self.projection = Some(schema);
        let tasks: Tasks = vec![Box::new(source), Box::new(projection)];
        Ok((self.sequential("sys-variable", tasks), VisitStatus::Continue))
    }
}
