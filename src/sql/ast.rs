//! Statement types handed to the planner. Statements are built by a front end
//! (or directly, in tests and embedding code); there is no SQL parser here.

use crate::common::Result;
use crate::datasource::{build_column_index, ColumnIndex};
use crate::sql::planner::{Expression, VisitStatus, Visitor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A statement kind dispatched through a [`Visitor`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Upsert(Upsert),
    Show(Show),
    Describe(Describe),
    Prepared(Prepared),
    Command(Command),
    Create(Create),
}

impl Statement {
    /// Dispatches the statement to the visitor method for its kind.
    pub fn accept<V: Visitor + ?Sized>(&mut self, visitor: &mut V) -> Result<(V::Output, VisitStatus)> {
        match self {
            Statement::Select(stmt) => visitor.visit_select(stmt),
            Statement::Insert(stmt) => visitor.visit_insert(stmt),
            Statement::Update(stmt) => visitor.visit_update(stmt),
            Statement::Delete(stmt) => visitor.visit_delete(stmt),
            Statement::Upsert(stmt) => visitor.visit_upsert(stmt),
            Statement::Show(stmt) => visitor.visit_show(stmt),
            Statement::Describe(stmt) => visitor.visit_describe(stmt),
            Statement::Prepared(stmt) => visitor.visit_prepared(stmt),
            Statement::Command(stmt) => visitor.visit_command(stmt),
            Statement::Create(stmt) => visitor.visit_create(stmt),
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Upsert(_) => "UPSERT",
            Statement::Show(_) => "SHOW",
            Statement::Describe(_) => "DESCRIBE",
            Statement::Prepared(_) => "PREPARE",
            Statement::Command(_) => "SET",
            Statement::Create(_) => "CREATE",
        }
    }
}

/// A SELECT statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub columns: Vec<ResultColumn>,
    pub from: Vec<FromClause>,
    pub where_clause: Option<Where>,
    /// The raw system expression of a FROM-less system query, e.g.
    /// `@@max_allowed_packet` or `current_user()`.
    pub sys_variable: Option<String>,
}

impl Select {
    pub fn new(columns: Vec<ResultColumn>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn from(mut self, from: FromClause) -> Self {
        self.from.push(from);
        self
    }

    pub fn filter(mut self, predicate: Expression) -> Self {
        self.where_clause = Some(Where::Expr(predicate));
        self
    }

    /// A FROM-less query of a system variable.
    pub fn system_variable(expr: &str) -> Self {
        Self {
            sys_variable: Some(expr.to_string()),
            ..Self::default()
        }
    }

    /// `SELECT database()`.
    pub fn database() -> Self {
        Self::new(vec![ResultColumn::expr(Expression::column(DATABASE_FN))])
    }

    /// True for statements answered by the engine itself rather than a source.
    pub fn system_query(&self) -> bool {
        self.from.is_empty() && (self.sys_variable.is_some() || self.is_database_query())
    }

    /// `SELECT database()`, or any single column aliased `database`.
    pub fn is_database_query(&self) -> bool {
        if !self.from.is_empty() {
            return false;
        }
        match self.columns.as_slice() {
            [ResultColumn::Expr { alias: Some(alias), .. }] if alias.eq_ignore_ascii_case("database") => true,
            [ResultColumn::Expr { expr: Expression::Column(name), .. }] => name.eq_ignore_ascii_case(DATABASE_FN),
            _ => false,
        }
    }

    /// The statement without its FROM list, as pushed down into a single
    /// source's sub-select.
    pub fn sub_statement(&self) -> Select {
        Select {
            columns: self.columns.clone(),
            from: Vec::new(),
            where_clause: self.where_clause.clone(),
            sys_variable: None,
        }
    }
}

pub const DATABASE_FN: &str = "database()";

/// An output column: `*` or an expression with an optional alias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResultColumn {
    Star,
    Expr {
        expr: Expression,
        alias: Option<String>,
    },
}

impl ResultColumn {
    pub fn expr(expr: Expression) -> Self {
        ResultColumn::Expr { expr, alias: None }
    }

    pub fn column(name: &str) -> Self {
        Self::expr(Expression::column(name))
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        ResultColumn::Expr {
            expr: Expression::column(name),
            alias: Some(alias.to_string()),
        }
    }

    /// The name this column is emitted under.
    pub fn output_name(&self) -> String {
        match self {
            ResultColumn::Star => "*".to_string(),
            ResultColumn::Expr { alias: Some(alias), .. } => alias.clone(),
            ResultColumn::Expr { expr, .. } => expr.to_string(),
        }
    }
}

/// A WHERE clause. Sub-queries are representable but can't be planned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Where {
    Expr(Expression),
    SubQuery(Box<Select>),
}

/// One entry of a FROM list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FromClause {
    /// The registered source (table) name.
    pub name: String,
    pub alias: Option<String>,
    /// This source's columns in the join predicate, matched positionally
    /// against the left side's key.
    pub join_columns: Vec<String>,
    /// Columns of the already joined (left) rows this source is matched
    /// against. Defaults to `join_columns`.
    pub join_with: Vec<String>,
    /// The sub-statement planned against this source.
    pub source: Option<Box<Select>>,
    /// Set for the build side of a join.
    pub seekable: bool,
    #[serde(skip)]
    pub col_index: Option<Arc<ColumnIndex>>,
}

impl FromClause {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn join_on(mut self, columns: &[&str]) -> Self {
        self.join_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn join_with(mut self, columns: &[&str]) -> Self {
        self.join_with = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn source_name(&self) -> &str {
        &self.name
    }

    /// The name rows of this source are qualified with: the alias if any.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// True if rows of this source need a join key attached.
    pub fn needs_join_key(&self) -> bool {
        self.source.is_some() && !self.join_columns.is_empty()
    }

    /// The left-side columns this source joins against.
    pub fn partner_columns(&self) -> &[String] {
        if self.join_with.is_empty() {
            &self.join_columns
        } else {
            &self.join_with
        }
    }

    /// Builds the column index from the source's column names. Once built the
    /// index is never recomputed.
    pub fn build_col_index(&mut self, columns: &[String]) -> Arc<ColumnIndex> {
        self.col_index
            .get_or_insert_with(|| Arc::new(build_column_index(columns)))
            .clone()
    }

    /// Points this clause at the part of a multi-source statement that
    /// belongs to it: the output columns qualified with this source (or
    /// unqualified), and no WHERE, which is applied after the join.
    pub fn rewrite(&mut self, stmt: &Select) {
        let qualifier = self.qualifier().to_string();
        let columns = stmt
            .columns
            .iter()
            .filter(|col| match col {
                ResultColumn::Star => true,
                ResultColumn::Expr { expr, .. } => expr.columns().iter().all(|name| {
                    name.split_once('.')
                        .map_or(true, |(source, _)| source == qualifier)
                }),
            })
            .cloned()
            .collect();
        self.source = Some(Box::new(Select {
            columns,
            from: Vec::new(),
            where_clause: None,
            sys_variable: None,
        }));
    }
}

/// `INSERT INTO table (columns) VALUES ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expression>>,
}

/// `UPDATE table SET column = expr WHERE ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: String,
    pub set: Vec<(String, Expression)>,
    pub where_clause: Option<Expression>,
}

/// `DELETE FROM table WHERE ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expression>,
}

/// `UPSERT INTO table (columns) VALUES ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Upsert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expression>>,
}

/// `SHOW ...`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub identity: String,
}

/// `DESCRIBE table`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Describe {
    pub identity: String,
}

/// `PREPARE alias FROM statement`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prepared {
    pub alias: String,
    pub statement: Box<Statement>,
}

/// `SET`-style session commands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub keyword: String,
    pub args: Vec<(String, Expression)>,
}

/// What a CREATE statement creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateKind {
    Source,
    Table,
    View,
    Schema,
}

/// `CREATE SOURCE identity WITH {...}`. The WITH block is a JSON object
/// decoded into the source configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Create {
    pub kind: CreateKind,
    pub identity: String,
    pub with: serde_json::Map<String, serde_json::Value>,
}

impl Create {
    pub fn source(identity: &str, with: serde_json::Value) -> Self {
        let with = match with {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            kind: CreateKind::Source,
            identity: identity.to_string(),
            with,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_query_detection() {
        assert!(Select::system_variable("@@max_allowed_packet").system_query());
        assert!(Select::database().system_query());
        assert!(Select::database().is_database_query());
        assert!(Select::new(vec![ResultColumn::aliased("schema()", "Database")]).is_database_query());
        assert!(!Select::new(vec![ResultColumn::aliased("schema()", "db")]).is_database_query());
        let select = Select::new(vec![ResultColumn::Star]).from(FromClause::new("users"));
        assert!(!select.system_query());
    }

    #[test]
    fn test_col_index_built_once() {
        let mut from = FromClause::new("users");
        let first = from.build_col_index(&["id".to_string()]);
        let second = from.build_col_index(&["other".to_string(), "id".to_string()]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get("id"), Some(&0));
    }

    #[test]
    fn test_rewrite_keeps_own_columns() {
        let stmt = Select::new(vec![
            ResultColumn::column("u.name"),
            ResultColumn::column("o.total"),
            ResultColumn::column("created"),
        ])
        .filter(Expression::column("u.id"));
        let mut from = FromClause::new("users").alias("u").join_on(&["u.id"]);
        assert!(!from.needs_join_key());
        from.rewrite(&stmt);

        let source = from.source.as_ref().unwrap();
        assert_eq!(source.columns.len(), 2);
        assert_eq!(source.columns[0].output_name(), "u.name");
        assert!(source.where_clause.is_none());
        assert!(from.needs_join_key());
        assert_eq!(from.partner_columns(), ["u.id".to_string()]);
    }
}
