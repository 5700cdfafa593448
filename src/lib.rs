#![crate_type = "lib"]
#![crate_name = "rustyql"]

pub mod common;
pub mod config;
pub mod datasource;
pub mod sql;
pub mod types;
