mod expression;
mod plan;
mod planner;

pub use expression::Expression;
pub use plan::PlanTask;
pub use planner::{Planner, VisitStatus, Visitor};
