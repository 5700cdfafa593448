pub mod ast;
pub mod engine;
pub mod execution;
pub mod planner;
