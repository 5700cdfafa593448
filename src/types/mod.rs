pub mod field;
mod schema;

pub use schema::{Column, DataType, Projection};
