use itertools::Itertools;
use rustyql::common::{Error, Result};
use rustyql::config::EngineConfig;
use rustyql::datasource::{CsvDataSource, MemoryDataSource, Registry, Row};
use rustyql::sql::ast::{Create, FromClause, ResultColumn, Select, Statement};
use rustyql::sql::engine::{Session, StatementResult};
use rustyql::types::field::Label;
use std::sync::Arc;

const USAGE: &str = "usage: rustyql <csv-file|stdin> [column ...]\n       rustyql --sys <expression>";
const SOURCE_NAME: &str = "input";

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let conf = EngineConfig::global();

    let registry = Arc::new(Registry::new());
    registry.register_type("csv", Arc::new(CsvDataSource::new(conf)?))?;
    registry.register_type("memory", Arc::new(MemoryDataSource::new()))?;
    let mut session = Session::new(registry);

    let select = match args.as_slice() {
        [flag, expr] if flag == "--sys" => Select::system_variable(expr),
        [path, columns @ ..] if !path.starts_with('-') => {
            let with = serde_json::json!({ "type": "csv", "settings": { "path": path } });
            execute(&mut session, Statement::Create(Create::source(SOURCE_NAME, with)))?;
            let columns = match columns {
                [] => vec![ResultColumn::Star],
                columns => columns.iter().map(|c| ResultColumn::column(c)).collect(),
            };
            Select::new(columns).from(FromClause::new(SOURCE_NAME))
        }
        _ => {
            eprintln!("{USAGE}");
            return Err(Error::InvalidInput("bad arguments".to_string()));
        }
    };
    let result = execute(&mut session, Statement::Select(select));
    session.registry().close()?;
    result
}

fn execute(session: &mut Session, stmt: Statement) -> Result<()> {
    match session.execute(stmt)? {
        StatementResult::CreateSource { name, registered } => match registered {
            true => log::info!("[console] Registered source '{name}'."),
            false => return Err(Error::Config(format!("could not register source '{name}'"))),
        },
        StatementResult::Select { columns, rows } => {
            print_columns(&columns);
            print_rows(&rows);
        }
    }
    Ok(())
}

fn print_columns(columns: &[Label]) {
    println!("  [{}]", columns.iter().map(|c| c.to_string()).join(", "));
}

fn print_rows(rows: &[Row]) {
    rows.iter()
        .for_each(|row| println!("  {}", row.iter().map(|field| field.to_string()).join(", ")));
}
