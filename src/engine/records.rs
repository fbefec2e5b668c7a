use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use super::{EngineKind, EngineOutput, QueryEngine};
use crate::error::{PipelineError, Result};

type RecordFn = dyn Fn(&str) -> std::result::Result<Value, String> + Send + Sync;

/// Single-capability backend: hands the query text to a function returning
/// JSON records.
///
/// Useful for wrapping REST sources or fixtures that cannot produce typed
/// solutions. Output goes through the record normalization heuristic.
pub struct RecordEngine {
    name: &'static str,
    run: Box<RecordFn>,
}

impl RecordEngine {
    /// Creates a backend named `name` around `run`.
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    /// Backend that always answers with `records`.
    pub fn fixed(name: &'static str, records: Value) -> Self {
        Self::new(name, move |_| Ok(records.clone()))
    }
}

impl fmt::Debug for RecordEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordEngine")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryEngine for RecordEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Fallback
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn execute(&self, query: &str) -> Result<EngineOutput> {
        (self.run)(query)
            .map(EngineOutput::Records)
            .map_err(PipelineError::QueryExecutionFailed)
    }
}
