//! Data sources and the capability traits the planner probes for.
//!
//! A [`DataSource`] is a registered backend type. Opening it for a table
//! yields a [`SourceConn`], which advertises what it can do through optional
//! capability accessors: rows via [`Scanner`], column names via
//! [`ColumnLister`], or its own plan fragments via [`SelfPlanner`].

mod csv;
mod membtree;
mod memory;
mod message;
mod registry;

pub use self::csv::CsvDataSource;
pub use membtree::StaticDataValue;
pub use memory::MemoryDataSource;
pub use message::{
    build_column_index, column_names, qualify_column_index, ColumnIndex, Message, Row,
};
pub use registry::{Registry, Schema, SourceFeatures};

use crate::common::Result;
use crate::config::SourceConfig;
use crate::sql::ast::FromClause;
use crate::sql::execution::BoxedTask;
use crate::sql::planner::VisitStatus;
use crate::types::Projection;

/// A registered source implementation.
pub trait DataSource: Send + Sync {
    /// Tables served by this source.
    fn tables(&self) -> Vec<String>;

    /// Opens a connection for a table (or other connection info, e.g. a path).
    fn open(&self, conn_info: &str) -> Result<Box<dyn SourceConn>>;

    /// Configuration hook run when a named source of this type is registered.
    fn setup(&self, _conf: &SourceConfig) -> Result<()> {
        Ok(())
    }

    /// Releases all resources. Must be safe to call repeatedly.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// An open connection to one table of a source.
pub trait SourceConn: Send {
    fn scanner(&mut self) -> Option<&mut dyn Scanner> {
        None
    }

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        None
    }

    fn self_planner(&mut self) -> Option<&mut dyn SelfPlanner> {
        None
    }

    /// Releases the connection. Must be safe to call repeatedly.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Iterates the rows of a connection.
pub trait Scanner: Send {
    /// The next row, or None once exhausted.
    fn next(&mut self) -> Result<Option<Message>>;
}

/// Reports the ordered column names of a connection.
pub trait ColumnLister {
    fn columns(&self) -> Vec<String>;
}

/// A source that compiles (part of) a select itself.
pub trait SelfPlanner {
    /// A visitor for sub-selects against this source, or None if the source
    /// can't plan after all.
    fn sub_select_visitor(&mut self) -> Result<Option<Box<dyn SubSelectVisitor>>>;

    /// The output projection of a fully delegated statement.
    fn projection(&self) -> Option<Projection> {
        None
    }
}

/// Plans the sub-select of one FROM clause for a self-planning source.
pub trait SubSelectVisitor {
    /// Returns the task for the FROM clause, if any, and whether it is the
    /// final plan for the whole statement.
    fn visit_sub_select(&mut self, from: &mut FromClause) -> Result<(Option<BoxedTask>, VisitStatus)>;

    fn column_lister(&self) -> Option<&dyn ColumnLister> {
        None
    }
}
