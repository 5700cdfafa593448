use crate::common::Result;
use crate::sql::planner::Expression;
use crate::types::Column;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A serializable description of one task of a compiled job. The tree mirrors
/// the task graph, so it can be shipped to another process and inspected
/// without the live channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlanTask {
    /// Scans a source.
    Source { from: Option<String> },
    /// Scans a source, qualifying its columns and attaching join keys.
    SourceJoin {
        from: String,
        join_columns: Vec<String>,
    },
    /// Pull-based scan of a source.
    Stepper { from: Option<String> },
    /// Drops rows not matching the predicate.
    Where { predicate: Expression },
    /// Attaches the join key computed from the given columns.
    JoinKey { from: String, columns: Vec<String> },
    /// Hash joins the left (probe) and right (build) inputs.
    JoinMerge { left: String, right: String },
    /// Shapes rows into the output columns.
    Projection { columns: Vec<Column> },
    /// Registers a source from a CREATE statement.
    Create { identity: String },
    /// A task planned by a self-planning source.
    Delegated { task_type: String },
    /// Children run as a chain, each reading its predecessor's output.
    Sequential { name: String, tasks: Vec<PlanTask> },
    /// Children run independently and concurrently.
    Parallel { name: String, tasks: Vec<PlanTask> },
}

impl PlanTask {
    pub fn task_type(&self) -> &'static str {
        match self {
            PlanTask::Source { .. } => "Source",
            PlanTask::SourceJoin { .. } => "SourceJoin",
            PlanTask::Stepper { .. } => "TaskStepper",
            PlanTask::Where { .. } => "Where",
            PlanTask::JoinKey { .. } => "JoinKey",
            PlanTask::JoinMerge { .. } => "JoinMerge",
            PlanTask::Projection { .. } => "Projection",
            PlanTask::Create { .. } => "Create",
            PlanTask::Delegated { .. } => "Delegated",
            PlanTask::Sequential { .. } => "Sequential",
            PlanTask::Parallel { .. } => "Parallel",
        }
    }

    pub fn children(&self) -> &[PlanTask] {
        match self {
            PlanTask::Sequential { tasks, .. } | PlanTask::Parallel { tasks, .. } => tasks,
            _ => &[],
        }
    }

    /// The stages rows pass through, in order: nested sequential chains are
    /// flattened, while a parallel group counts as a single stage.
    pub fn stages(&self) -> Vec<&PlanTask> {
        match self {
            PlanTask::Sequential { tasks, .. } => tasks.iter().flat_map(|t| t.stages()).collect(),
            task => vec![task],
        }
    }

    /// All tasks of the tree in pre-order.
    pub fn walk(&self) -> Vec<&PlanTask> {
        let mut tasks = vec![self];
        for child in self.children() {
            tasks.extend(child.walk());
        }
        tasks
    }

    /// Counts the tasks of a type anywhere in the tree.
    pub fn count(&self, task_type: &str) -> usize {
        self.walk()
            .into_iter()
            .filter(|t| t.task_type() == task_type)
            .count()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn format(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            PlanTask::Source { from } | PlanTask::Stepper { from } => write!(
                f,
                "{indent}{} {}",
                self.task_type(),
                from.as_deref().unwrap_or("<static>")
            )?,
            PlanTask::SourceJoin { from, join_columns } => {
                write!(f, "{indent}SourceJoin {from} on {}", join_columns.join(", "))?
            }
            PlanTask::Where { predicate } => write!(f, "{indent}Where {predicate}")?,
            PlanTask::JoinKey { from, columns } => {
                write!(f, "{indent}JoinKey {from} ({})", columns.join(", "))?
            }
            PlanTask::JoinMerge { left, right } => write!(f, "{indent}JoinMerge {left} x {right}")?,
            PlanTask::Projection { columns } => write!(
                f,
                "{indent}Projection {}",
                columns.iter().map(|c| c.to_string()).join(", ")
            )?,
            PlanTask::Create { identity } => write!(f, "{indent}Create {identity}")?,
            PlanTask::Delegated { task_type } => write!(f, "{indent}Delegated {task_type}")?,
            PlanTask::Sequential { name, tasks } | PlanTask::Parallel { name, tasks } => {
                write!(f, "{indent}{} {name}", self.task_type())?;
                for task in tasks {
                    writeln!(f)?;
                    task.format(f, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for PlanTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn plan() -> PlanTask {
        PlanTask::Sequential {
            name: "select".to_string(),
            tasks: vec![
                PlanTask::Sequential {
                    name: "sub-select".to_string(),
                    tasks: vec![PlanTask::Source {
                        from: Some("users".to_string()),
                    }],
                },
                PlanTask::Projection {
                    columns: vec![Column::new("name", DataType::Unknown)],
                },
            ],
        }
    }

    #[test]
    fn test_stages_flatten_chains() {
        let plan = plan();
        let stages: Vec<&str> = plan.stages().iter().map(|t| t.task_type()).collect();
        assert_eq!(stages, vec!["Source", "Projection"]);
        assert_eq!(plan.count("Sequential"), 2);
    }

    #[test]
    fn test_bytes_preserve_plan() -> Result<()> {
        let plan = plan();
        assert_eq!(PlanTask::from_bytes(&plan.to_bytes()?)?, plan);
        assert!(PlanTask::from_bytes(&[0xff, 0xff]).is_err());
        Ok(())
    }

    #[test]
    fn test_display() {
        let text = plan().to_string();
        assert_eq!(
            text,
            "Sequential select\n  Sequential sub-select\n    Source users\n  Projection name:unknown"
        );
    }
}
