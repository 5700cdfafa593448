use crate::common::{Error, Result};
use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Per-job execution context shared by every task of the graph.
#[derive(Debug, Default)]
pub struct Context {
    schema: String,
    errors: Mutex<Vec<Error>>,
}

impl Context {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// The schema (connection database) the job runs against.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn record(&self, err: Error) {
        match self.errors.lock() {
            Ok(mut errors) => errors.push(err),
            Err(poisoned) => poisoned.into_inner().push(err),
        }
    }

    /// Errors recorded while the job ran, oldest first.
    pub fn errors(&self) -> Vec<Error> {
        match self.errors.lock() {
            Ok(errors) => errors.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Runs a task body, turning a panic into a recorded runtime error.
    pub fn recover<F>(&self, task_type: &str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(payload) => {
                let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                error!("recovered from panic in {task_type}: {msg}");
                let err = Error::Runtime(format!("panic in {task_type}: {msg}"));
                self.record(err.clone());
                Err(err)
            }
        }
    }
}
