use crate::common::constants::{
    MUST_IMPLEMENT_COLUMNS_MSG, MUST_IMPLEMENT_SCANNER_MSG, NOT_A_LIST_TASK_MSG,
};
use crate::common::utility::create_memory_table;
use crate::common::{Error, Result};
use crate::config::{EngineConfig, SourceConfig};
use crate::datasource::{
    build_column_index, ColumnIndex, ColumnLister, CsvDataSource, DataSource, MemoryDataSource,
    Message, Registry, Scanner, SelfPlanner, SourceConn, StaticDataValue, SubSelectVisitor,
};
use crate::sql::ast::{Create, CreateKind, FromClause, Insert, ResultColumn, Select, Statement, Where as WhereClause};
use crate::sql::engine::{Session, StatementResult};
use crate::sql::execution::{
    BoxedTask, Context, Job, Parallel, Projection, Sequential, TaskBase, TaskRunner, TaskStepper,
    Where,
};
use crate::sql::planner::{Expression, PlanTask, Planner, VisitStatus};
use crate::types::field::Field;
use crate::types::{DataType, Projection as ProjectionSchema};
use crossbeam::channel::{self, RecvTimeoutError};
use itertools::Itertools;
use predicates::prelude::*;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "default";
const TIMEOUT: Duration = Duration::from_secs(5);

// ================================ Test sources ================================

/// Memory tables `users` and `orders`, registered by name.
fn shop() -> Result<Arc<Registry>> {
    let memory = Arc::new(MemoryDataSource::new());
    memory.create_table("users", &["id", "name"])?;
    memory.insert(
        "users",
        vec![
            vec![Field::from(1), Field::from("alice")],
            vec![Field::from(2), Field::from("bob")],
            vec![Field::from(3), Field::from("carol")],
        ],
    )?;
    memory.create_table("orders", &["id", "user_id", "total"])?;
    memory.insert(
        "orders",
        vec![
            vec![Field::from(10), Field::from(1), Field::from(30)],
            vec![Field::from(11), Field::from(2), Field::from(5)],
            vec![Field::from(12), Field::from(1), Field::from(12)],
        ],
    )?;

    let registry = Arc::new(Registry::new());
    registry.register_type("memory", memory.clone())?;
    for table in ["users", "orders"] {
        registry.add_source(SourceConfig::new(table, "memory"), memory.clone())?;
    }
    Ok(registry)
}

#[derive(Clone, Copy)]
enum Behavior {
    Endless,
    Panics,
    Opaque,
}

/// A one-column source with scripted behavior.
struct Synthetic(Behavior);

impl DataSource for Synthetic {
    fn tables(&self) -> Vec<String> {
        Vec::new()
    }

    fn open(&self, _conn_info: &str) -> Result<Box<dyn SourceConn>> {
        Ok(Box::new(SyntheticConn {
            behavior: self.0,
            id: 0,
            index: Arc::new(build_column_index(&["n".to_string()])),
        }))
    }
}

struct SyntheticConn {
    behavior: Behavior,
    id: u64,
    index: Arc<ColumnIndex>,
}

impl SourceConn for SyntheticConn {
    fn scanner(&mut self) -> Option<&mut dyn Scanner> {
        match self.behavior {
            Behavior::Opaque => None,
            _ => Some(self),
        }
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        Some(self)
    }
}

impl ColumnLister for SyntheticConn {
    fn columns(&self) -> Vec<String> {
        vec!["n".to_string()]
    }
}

impl Scanner for SyntheticConn {
    fn next(&mut self) -> Result<Option<Message>> {
        if let Behavior::Panics = self.behavior {
            panic!("scanner exploded");
        }
        self.id += 1;
        let values = vec![Field::from(self.id as i64)];
        Ok(Some(Message::new(self.id, values, self.index.clone())))
    }
}

fn synthetic(name: &str, behavior: Behavior) -> Result<Arc<Registry>> {
    let registry = Arc::new(Registry::new());
    registry.add_source(SourceConfig::new(name, "synthetic"), Arc::new(Synthetic(behavior)))?;
    Ok(registry)
}

/// A task planned by a remote source: emits its `answer` rows itself.
struct RemoteScan {
    base: TaskBase,
    answers: Vec<i64>,
}

impl RemoteScan {
    fn new(answers: Vec<i64>) -> Self {
        Self {
            base: TaskBase::new("RemoteScan", &EngineConfig::default()),
            answers,
        }
    }
}

impl TaskRunner for RemoteScan {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, _ctx: &crate::sql::execution::Context) -> Result<()> {
        let emitter = self.base.emitter();
        let index = Arc::new(build_column_index(&["answer".to_string()]));
        for (i, answer) in self.answers.iter().enumerate() {
            if !emitter.emit(Message::new(i as u64 + 1, vec![Field::from(*answer)], index.clone())) {
                break;
            }
        }
        drop(emitter);
        self.base.close_output();
        Ok(())
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Delegated {
            task_type: self.base.task_type().to_string(),
        }
    }
}

/// A self-planning source. Its sub-select visitor returns a [`RemoteScan`]
/// (or nothing) with a fixed status; as a fallback it scans a single
/// constant row.
struct Remote {
    status: VisitStatus,
    plans_task: bool,
    lists_columns: bool,
}

impl DataSource for Remote {
    fn tables(&self) -> Vec<String> {
        vec!["remote".to_string()]
    }

    fn open(&self, _conn_info: &str) -> Result<Box<dyn SourceConn>> {
        Ok(Box::new(RemoteConn {
            status: self.status,
            plans_task: self.plans_task,
            lists_columns: self.lists_columns,
            fallback: StaticDataValue::new("answer", Field::from(7)),
        }))
    }
}

struct RemoteConn {
    status: VisitStatus,
    plans_task: bool,
    lists_columns: bool,
    fallback: StaticDataValue,
}

impl SourceConn for RemoteConn {
    fn scanner(&mut self) -> Option<&mut dyn Scanner> {
        self.fallback.scanner()
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        self.fallback.column_lister()
    }

    fn self_planner(&mut self) -> Option<&mut dyn SelfPlanner> {
        Some(self)
    }
}

impl SelfPlanner for RemoteConn {
    fn sub_select_visitor(&mut self) -> Result<Option<Box<dyn SubSelectVisitor>>> {
        Ok(Some(Box::new(RemoteVisitor {
            status: self.status,
            plans_task: self.plans_task,
            lists_columns: self.lists_columns,
        })))
    }

    fn projection(&self) -> Option<ProjectionSchema> {
        let mut projection = ProjectionSchema::new();
        projection.add_column("answer", DataType::Int);
        Some(projection)
    }
}

struct RemoteVisitor {
    status: VisitStatus,
    plans_task: bool,
    lists_columns: bool,
}

impl ColumnLister for RemoteVisitor {
    fn columns(&self) -> Vec<String> {
        vec!["answer".to_string()]
    }
}

impl SubSelectVisitor for RemoteVisitor {
    fn visit_sub_select(&mut self, _from: &mut FromClause) -> Result<(Option<BoxedTask>, VisitStatus)> {
        let task = self
            .plans_task
            .then(|| Box::new(RemoteScan::new(vec![1, 2, 3])) as BoxedTask);
        Ok((task, self.status))
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        match self.lists_columns {
            true => Some(self),
            false => None,
        }
    }
}

fn add_remote(registry: &Arc<Registry>, status: VisitStatus, plans_task: bool, lists_columns: bool) -> Result<()> {
    registry.add_source(
        SourceConfig::new("remote", "remote"),
        Arc::new(Remote { status, plans_task, lists_columns }),
    )
}

fn remote(status: VisitStatus, plans_task: bool) -> Result<Arc<Registry>> {
    let registry = Arc::new(Registry::new());
    add_remote(&registry, status, plans_task, false)?;
    Ok(registry)
}

/// `users` joined with a final self-planning source on `u.id = r.answer`.
fn users_join_remote() -> Select {
    Select::new(vec![ResultColumn::column("u.name"), ResultColumn::column("answer")])
        .from(FromClause::new("users").alias("u").join_on(&["u.id"]))
        .from(
            FromClause::new("remote")
                .alias("r")
                .join_on(&["r.answer"])
                .join_with(&["u.id"]),
        )
}

/// A task whose resources can't be released.
struct Unclosable {
    base: TaskBase,
}

impl TaskRunner for Unclosable {
    fn base(&self) -> &TaskBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TaskBase {
        &mut self.base
    }

    fn run(&mut self, _ctx: &Context) -> Result<()> {
        self.base.close_output();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Err(Error::Runtime("still in use".to_string()))
    }

    fn plan(&self) -> PlanTask {
        PlanTask::Delegated {
            task_type: self.base.task_type().to_string(),
        }
    }
}

fn unclosable() -> BoxedTask {
    Box::new(Unclosable {
        base: TaskBase::new("Unclosable", &EngineConfig::default()),
    })
}

// ================================== Helpers ===================================

fn plan(registry: &Arc<Registry>, select: Select) -> Result<(PlanTask, Job)> {
    let mut stmt = Statement::Select(select);
    let (planner, _) = Planner::build(SCHEMA, &mut stmt, registry.clone(), &EngineConfig::default())?;
    let plan = planner.tasks()[0].clone();
    Ok((plan, planner.into_job()?))
}

fn session(registry: &Arc<Registry>) -> Session {
    Session::with_schema(registry.clone(), SCHEMA, &EngineConfig::default())
}

/// Runs a select and checks its output against `"columns ; row ; row"`.
fn select_expect(registry: &Arc<Registry>, select: Select, expected: &str) {
    match session(registry).execute(Statement::Select(select)).unwrap() {
        StatementResult::Select { columns, rows } => {
            let lines = expected.split(';').map(str::trim).collect::<Vec<&str>>();
            let (expected_columns, expected_rows) = lines.split_at(1);
            assert_eq!(
                columns.iter().map(|c| c.to_string()).join(", "),
                expected_columns[0]
            );
            let expected_rows = expected_rows
                .iter()
                .filter(|row| !row.is_empty())
                .copied()
                .collect::<Vec<&str>>();
            assert_eq!(
                rows.iter().map(|r| r.to_string()).collect::<Vec<String>>(),
                expected_rows
            );
        }
        result => panic!("expected a select result, got {result:?}"),
    }
}

fn column(name: &str) -> Box<Expression> {
    Box::new(Expression::column(name))
}

fn constant(value: impl Into<Field>) -> Box<Expression> {
    Box::new(Expression::Constant(value.into()))
}

fn users_join_orders() -> Select {
    Select::new(vec![
        ResultColumn::column("u.name"),
        ResultColumn::column("o.total"),
    ])
    .from(FromClause::new("users").alias("u").join_on(&["u.id"]))
    .from(
        FromClause::new("orders")
            .alias("o")
            .join_on(&["o.user_id"])
            .join_with(&["u.id"]),
    )
}

// ================================== Planning ==================================

#[test]
fn test_single_source_has_two_stages() -> Result<()> {
    let registry = shop()?;
    let (plan, job) = plan(&registry, Select::new(vec![ResultColumn::column("name")]).from(FromClause::new("users")))?;

    assert_eq!(plan.children().len(), 2);
    assert!(matches!(&plan.children()[0], PlanTask::Sequential { name, .. } if name == "sub-select"));
    assert!(matches!(plan.children()[1], PlanTask::Projection { .. }));
    assert_eq!(plan.count("Projection"), 1);
    assert_eq!(job.status(), VisitStatus::Continue);
    assert_eq!(
        job.projection().map(|p| p.labels().iter().map(|l| l.to_string()).join(",")),
        Some("name".to_string())
    );
    Ok(())
}

#[test]
fn test_joins_fold_in_declaration_order() -> Result<()> {
    let memory = Arc::new(MemoryDataSource::new());
    let registry = Arc::new(Registry::new());
    for (table, column) in [("a", "x"), ("b", "y"), ("c", "z")] {
        memory.create_table(table, &["id", column])?;
        memory.insert(
            table,
            (1..=3).map(|i| vec![Field::from(i), Field::from(format!("{column}{i}"))]).collect(),
        )?;
        registry.add_source(SourceConfig::new(table, "memory"), memory.clone())?;
    }
    let select = Select::new(vec![ResultColumn::column("a.x")])
        .from(FromClause::new("a").join_on(&["a.id"]))
        .from(FromClause::new("b").join_on(&["b.id"]).join_with(&["a.id"]))
        .from(FromClause::new("c").join_on(&["c.id"]).join_with(&["a.id"]));
    let (plan, _) = plan(&registry, select.clone())?;

    let merges = plan
        .walk()
        .into_iter()
        .filter_map(|task| match task {
            PlanTask::JoinMerge { left, right } => Some((left.as_str(), right.as_str())),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(merges, vec![("a", "b"), ("a,b", "c")]);
    assert_eq!(plan.count("Projection"), 1);

    select_expect(&registry, select, "a.x ; x1 ; x2 ; x3");
    Ok(())
}

#[test]
fn test_plan_survives_serialization() -> Result<()> {
    let (plan, _) = plan(&shop()?, users_join_orders())?;
    assert_eq!(PlanTask::from_bytes(&plan.to_bytes()?)?, plan);
    Ok(())
}

#[test]
fn test_missing_source() -> Result<()> {
    let select = Select::new(vec![ResultColumn::Star]).from(FromClause::new("nowhere"));
    let err = plan(&shop()?, select).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
    assert!(predicate::str::contains("nowhere").eval(&err.to_string()));
    Ok(())
}

#[test]
fn test_select_without_from() -> Result<()> {
    let err = plan(&shop()?, Select::new(vec![ResultColumn::column("x")])).err().unwrap();
    assert!(err.is_planning());
    Ok(())
}

#[test]
fn test_sub_query_where_is_rejected() -> Result<()> {
    let registry = shop()?;
    let sub_query = WhereClause::SubQuery(Box::new(Select::new(vec![ResultColumn::column("id")])));

    let mut single = Select::new(vec![ResultColumn::Star]).from(FromClause::new("users"));
    single.where_clause = Some(sub_query.clone());
    let err = plan(&registry, single).err().unwrap();
    assert!(predicate::str::contains("Unsupported Where Type").eval(&err.to_string()));

    let mut joined = users_join_orders();
    joined.where_clause = Some(sub_query);
    assert!(matches!(plan(&registry, joined).err(), Some(Error::Plan(_))));
    Ok(())
}

#[test]
fn test_source_without_scanner() -> Result<()> {
    let registry = synthetic("opaque", Behavior::Opaque)?;
    let select = Select::new(vec![ResultColumn::Star]).from(FromClause::new("opaque"));
    let err = plan(&registry, select).err().unwrap();
    assert!(matches!(err, Error::Plan(_)));
    assert!(predicate::str::contains(MUST_IMPLEMENT_SCANNER_MSG).eval(&err.to_string()));
    Ok(())
}

#[test]
fn test_only_composites_accept_children() {
    let conf = EngineConfig::default();
    let mut filter = Where::new(Expression::Constant(Field::from(true)), &conf);
    let err = filter
        .add(Box::new(Projection::new(vec![ResultColumn::Star], &conf)))
        .unwrap_err();
    assert!(predicate::str::contains(NOT_A_LIST_TASK_MSG).eval(&err.to_string()));

    let mut chain = Sequential::new("chain", Vec::new(), &conf);
    chain
        .add(Box::new(Projection::new(vec![ResultColumn::Star], &conf)))
        .unwrap();
    assert_eq!(chain.children().len(), 1);
}

// =============================== System queries ===============================

#[test]
fn test_system_variables() -> Result<()> {
    let registry = Arc::new(Registry::new());
    select_expect(
        &registry,
        Select::system_variable("@@max_allowed_packet"),
        "@@max_allowed_packet ; 1048576",
    );
    select_expect(&registry, Select::system_variable("current_user()"), "current_user() ; user");
    select_expect(&registry, Select::system_variable("CONNECTION_ID()"), "connection_id() ; 1");
    select_expect(
        &registry,
        Select::system_variable("TIMEDIFF(CURTIME(), UTC_TIME())"),
        "timediff ; 00:00:00.000000",
    );
    select_expect(&registry, Select::database(), &format!("database ; {SCHEMA}"));
    select_expect(
        &registry,
        Select::new(vec![ResultColumn::aliased("schema()", "DATABASE")]),
        &format!("database ; {SCHEMA}"),
    );
    Ok(())
}

#[test]
fn test_system_variable_projection_is_typed() -> Result<()> {
    let (plan, job) = plan(&Arc::new(Registry::new()), Select::system_variable("@@max_allowed_packet"))?;
    assert_eq!(plan.stages().len(), 2);
    let projection = job.projection().unwrap();
    assert_eq!(projection.columns()[0].data_type(), DataType::Int);
    Ok(())
}

#[test]
fn test_unknown_system_variable() {
    let err = plan(&Arc::new(Registry::new()), Select::system_variable("@@bogus"))
        .err()
        .unwrap();
    assert!(matches!(err, Error::Plan(_)));
    assert!(predicate::str::contains("Unrecognized System Variable: @@bogus").eval(&err.to_string()));
}

// ================================= Execution ==================================

#[test]
fn test_select_with_where() -> Result<()> {
    let memory = Arc::new(MemoryDataSource::new());
    let rows = create_memory_table(&memory, "items", &[("score", DataType::Int)], 200, Some(42))?;
    let registry = Arc::new(Registry::new());
    registry.add_source(SourceConfig::new("items", "memory"), memory)?;

    let select = Select::new(vec![ResultColumn::column("id"), ResultColumn::column("score")])
        .from(FromClause::new("items"))
        .filter(Expression::LessThan(column("id"), constant(50)));
    let expected = rows
        .iter()
        .take(50)
        .map(|row| format!("{}, {}", row[0], row[1]))
        .join(" ; ");
    select_expect(&registry, select, &format!("id, score ; {expected}"));
    Ok(())
}

#[test]
fn test_projection_keeps_scan_order() -> Result<()> {
    select_expect(
        &shop()?,
        Select::new(vec![ResultColumn::column("name")]).from(FromClause::new("users")),
        "name ; alice ; bob ; carol",
    );
    Ok(())
}

#[test]
fn test_repeated_output_names() -> Result<()> {
    select_expect(
        &shop()?,
        Select::new(vec![ResultColumn::column("name"), ResultColumn::column("name")])
            .from(FromClause::new("users")),
        "name, name ; alice, alice ; bob, bob ; carol, carol",
    );
    Ok(())
}

#[test]
fn test_join() -> Result<()> {
    select_expect(
        &shop()?,
        users_join_orders(),
        "u.name, o.total ; alice, 30 ; alice, 12 ; bob, 5",
    );
    Ok(())
}

#[test]
fn test_where_applies_after_join() -> Result<()> {
    let registry = shop()?;
    let select = users_join_orders().filter(Expression::GreaterThan(column("o.total"), constant(10)));
    let (plan, _) = plan(&registry, select.clone())?;
    let stages = plan.children().iter().map(|t| t.task_type()).collect::<Vec<_>>();
    assert_eq!(stages, vec!["Sequential", "Where", "Projection"]);

    select_expect(&registry, select, "u.name, o.total ; alice, 30 ; alice, 12");
    Ok(())
}

#[test]
fn test_join_without_keys_is_a_cross_join() -> Result<()> {
    let select = Select::new(vec![ResultColumn::column("u.name"), ResultColumn::column("o.id")])
        .from(FromClause::new("users").alias("u"))
        .from(FromClause::new("orders").alias("o"));
    select_expect(
        &shop()?,
        select,
        "u.name, o.id ; alice, 10 ; alice, 11 ; alice, 12 ; bob, 10 ; bob, 11 ; bob, 12 ; \
         carol, 10 ; carol, 11 ; carol, 12",
    );
    Ok(())
}

#[test]
fn test_csv_drops_malformed_rows() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "id,name\n1,a\n2,b\n3,c,oops\n4,d\n5,e\n6,f\n")?;

    let conf = EngineConfig::default();
    let registry = Arc::new(Registry::new());
    registry.register_type("csv", Arc::new(CsvDataSource::new(&conf)?))?;
    let mut session = session(&registry);
    let with = serde_json::json!({
        "type": "csv",
        "settings": { "path": file.path().to_string_lossy() },
    });
    session.execute(Statement::Create(Create::source("people", with)))?;

    select_expect(
        &registry,
        Select::new(vec![ResultColumn::Star]).from(FromClause::new("people")),
        "id, name ; 1, a ; 2, b ; 4, d ; 5, e ; 6, f",
    );
    Ok(())
}

#[test]
fn test_cancel_closes_output() -> Result<()> {
    let registry = synthetic("endless", Behavior::Endless)?;
    let (_, mut job) = plan(&registry, Select::new(vec![ResultColumn::column("n")]).from(FromClause::new("endless")))?;
    job.setup()?;
    let out = job.message_out();
    let canceller = job.cancel_handle();
    let handle = std::thread::spawn(move || job.run());

    for _ in 0..10 {
        out.recv_timeout(TIMEOUT).expect("endless source stalled");
    }
    canceller.cancel();
    loop {
        match out.recv_timeout(TIMEOUT) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("output still open after cancel"),
        }
    }
    handle.join().expect("job thread panicked")
}

#[test]
fn test_signal_stops_task_with_endless_input() -> Result<()> {
    let conf = EngineConfig::default();
    let (tx, rx) = channel::bounded(conf.channel_size);
    let producer = std::thread::spawn(move || {
        let index = Arc::new(build_column_index(&["n".to_string()]));
        let mut id = 0;
        loop {
            id += 1;
            let msg = Message::new(id, vec![Field::from(id as i64)], index.clone());
            if tx.send(msg).is_err() {
                return id;
            }
        }
    });

    let mut projection = Projection::new(vec![ResultColumn::Star], &conf);
    projection.set_message_in(rx);
    projection.setup(0)?;
    let out = projection.message_out();
    let sig = projection.sig_chan();
    let task = std::thread::spawn(move || projection.run(&Context::new(SCHEMA)));

    // leave the output undrained so the task blocks on a full channel
    let deadline = std::time::Instant::now() + TIMEOUT;
    while !out.is_full() {
        assert!(std::time::Instant::now() < deadline, "output never filled");
        std::thread::sleep(Duration::from_millis(1));
    }
    sig.send(true).unwrap();

    let mut drained = 0;
    loop {
        match out.recv_timeout(TIMEOUT) {
            Ok(_) => drained += 1,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("output still open after signal"),
        }
    }
    assert!(drained <= conf.channel_size + 1);
    task.join().expect("task thread panicked")?;
    assert!(producer.join().expect("producer panicked") > drained as u64);
    Ok(())
}

#[test]
fn test_close_failures_are_logged_only() -> Result<()> {
    let conf = EngineConfig::default();
    let mut chain = Sequential::new("chain", vec![unclosable()], &conf);
    chain.close()?;
    chain.close()?;
    let mut group = Parallel::new("group", vec![unclosable(), unclosable()], &conf);
    group.close()?;
    Ok(())
}

#[test]
fn test_panic_is_recovered() -> Result<()> {
    let registry = synthetic("fragile", Behavior::Panics)?;
    let (_, mut job) = plan(&registry, Select::new(vec![ResultColumn::Star]).from(FromClause::new("fragile")))?;
    let err = job.collect().unwrap_err();
    assert!(err.is_runtime());
    assert!(predicate::str::contains("scanner exploded").eval(&err.to_string()));
    assert!(!job.context().errors().is_empty());
    Ok(())
}

#[test]
fn test_close_twice() -> Result<()> {
    let (_, mut job) = plan(&shop()?, users_join_orders())?;
    assert_eq!(job.collect()?.len(), 3);
    job.close()?;
    job.close()?;
    Ok(())
}

#[test]
fn test_stepper() -> Result<()> {
    let memory = MemoryDataSource::new();
    create_memory_table(&memory, "steps", &[], 3, None)?;
    let conf = EngineConfig::default();

    let mut stepper = TaskStepper::new(None, memory.open("steps")?, &conf);
    let ids = std::iter::from_fn(|| stepper.next().transpose())
        .map(|msg| msg.map(|m| m.values()[0].clone()))
        .collect::<Result<Vec<Field>>>()?;
    assert_eq!(ids, vec![Field::from(0), Field::from(1), Field::from(2)]);
    assert!(stepper.next()?.is_none());

    let mut stepper = TaskStepper::new(None, memory.open("steps")?, &conf);
    stepper.sig_chan().send(true).unwrap();
    assert!(stepper.next()?.is_none());
    stepper.close()?;
    stepper.close()?;
    Ok(())
}

// ============================ Self-planning sources ============================

#[test]
fn test_final_delegate_plan() -> Result<()> {
    let registry = remote(VisitStatus::Final, true)?;
    let select = Select::new(vec![ResultColumn::column("answer")]).from(FromClause::new("remote"));
    let (plan, job) = plan(&registry, select.clone())?;
    assert_eq!(plan, PlanTask::Delegated { task_type: "RemoteScan".to_string() });
    assert_eq!(job.status(), VisitStatus::Final);
    assert_eq!(job.projection().map(|p| p.len()), Some(1));

    select_expect(&registry, select, "answer ; 1 ; 2 ; 3");
    Ok(())
}

#[test]
fn test_continued_delegate_plan() -> Result<()> {
    let registry = remote(VisitStatus::Continue, true)?;
    let select = Select::new(vec![ResultColumn::column("answer")]).from(FromClause::new("remote"));
    let (plan, _) = plan(&registry, select.clone())?;
    assert_eq!(plan.count("Delegated"), 1);
    assert_eq!(plan.count("Projection"), 1);

    select_expect(&registry, select, "answer ; 1 ; 2 ; 3");
    Ok(())
}

#[test]
fn test_delegate_without_task_falls_back_to_scan() -> Result<()> {
    let registry = remote(VisitStatus::Continue, false)?;
    let select = Select::new(vec![ResultColumn::column("answer")]).from(FromClause::new("remote"));
    let (plan, _) = plan(&registry, select.clone())?;
    assert_eq!(plan.count("Source"), 1);

    select_expect(&registry, select, "answer ; 7");
    Ok(())
}

#[test]
fn test_final_delegate_without_task() -> Result<()> {
    let registry = remote(VisitStatus::Final, false)?;
    let select = Select::new(vec![ResultColumn::Star]).from(FromClause::new("remote"));
    assert!(matches!(plan(&registry, select).err(), Some(Error::Plan(_))));
    Ok(())
}

#[test]
fn test_final_delegate_in_join_is_keyed() -> Result<()> {
    let registry = shop()?;
    add_remote(&registry, VisitStatus::Final, true, true)?;
    let (plan, _) = plan(&registry, users_join_remote())?;
    let keyed = plan.walk().into_iter().any(|task| {
        matches!(
            task.children(),
            [PlanTask::Delegated { .. }, PlanTask::JoinKey { from, columns }]
                if from == "r" && columns == &vec!["r.answer".to_string()]
        )
    });
    assert!(keyed, "no join key after the delegated task:\n{plan}");
    assert_eq!(plan.count("JoinMerge"), 1);

    select_expect(
        &registry,
        users_join_remote(),
        "u.name, answer ; alice, 1 ; bob, 2 ; carol, 3",
    );
    Ok(())
}

#[test]
fn test_final_delegate_in_join_needs_columns() -> Result<()> {
    let registry = shop()?;
    add_remote(&registry, VisitStatus::Final, true, false)?;
    let err = plan(&registry, users_join_remote()).err().unwrap();
    assert!(matches!(err, Error::Plan(_)));
    assert!(predicate::str::contains(MUST_IMPLEMENT_COLUMNS_MSG).eval(&err.to_string()));
    Ok(())
}

// ===================================== DDL ====================================

#[test]
fn test_create_source() -> Result<()> {
    let registry = Arc::new(Registry::new());
    registry.register_type("memory", Arc::new(MemoryDataSource::new()))?;
    let mut session = session(&registry);

    let with = serde_json::json!({ "type": "memory", "settings": { "columns": "id, name" } });
    let result = session.execute(Statement::Create(Create::source("people", with)))?;
    assert_eq!(
        result,
        StatementResult::CreateSource { name: "people".to_string(), registered: true }
    );
    // bound into its own schema, not the session's
    let schema = registry.schema("people")?.unwrap();
    assert_eq!(schema.source_names(), vec!["people".to_string()]);
    assert!(registry.schema(SCHEMA)?.is_none());

    // an empty table still reports its columns
    select_expect(
        &registry,
        Select::new(vec![ResultColumn::column("name")]).from(FromClause::new("people")),
        "name ;",
    );
    Ok(())
}

#[test]
fn test_create_source_of_unknown_type() -> Result<()> {
    let registry = Arc::new(Registry::new());
    let result = session(&registry).execute(Statement::Create(Create::source(
        "ghost",
        serde_json::json!({ "type": "nosuch" }),
    )))?;
    assert_eq!(
        result,
        StatementResult::CreateSource { name: "ghost".to_string(), registered: false }
    );
    assert!(registry.get("ghost")?.is_none());
    Ok(())
}

#[test]
fn test_create_source_with_bad_config() {
    let err = session(&Arc::new(Registry::new()))
        .execute(Statement::Create(Create::source("bad", serde_json::json!({ "settings": {} }))))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_unimplemented_statements() {
    let mut session = session(&Arc::new(Registry::new()));
    let create_table = Create {
        kind: CreateKind::Table,
        identity: "t".to_string(),
        with: serde_json::Map::new(),
    };
    assert!(matches!(
        session.execute(Statement::Create(create_table)),
        Err(Error::NotImplemented(_))
    ));

    let insert = Insert {
        table: "t".to_string(),
        columns: Vec::new(),
        rows: Vec::new(),
    };
    let err = session.execute(Statement::Insert(insert)).unwrap_err();
    assert!(matches!(err, Error::NotImplemented(_)));
    assert!(predicate::str::contains("INSERT").eval(&err.to_string()));
}
