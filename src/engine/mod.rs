//! Backend-agnostic query execution.
//!
//! Backends implement [`QueryEngine`] and declare their [`EngineKind`]. The
//! [`EngineAdapter`] picks one per call, creates the primary backend lazily
//! (once per adapter), and normalizes whatever result shape the backend
//! produced into a [`BindingStream`].

mod normalize;
mod oxigraph;
mod records;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::error::{PipelineError, Result};
use crate::term::{BindingRow, Term};

pub use self::oxigraph::OxigraphEngine;
pub use normalize::{records_to_rows, solutions_to_rows};
pub use records::RecordEngine;

/// Capability class of a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Full query engine producing typed solutions.
    Primary,
    /// Single-capability backend producing loosely typed records.
    Fallback,
}

/// One solution as produced by a solution-oriented backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Solution {
    /// Variable/term pairs; keys may carry a `?` or `$` sigil.
    pub entries: Vec<(String, Term)>,
}

impl Solution {
    /// Solution from `entries`.
    pub fn new(entries: Vec<(String, Term)>) -> Self {
        Self { entries }
    }
}

/// Raw backend output before normalization.
#[derive(Debug)]
pub enum EngineOutput {
    /// Typed solutions.
    Solutions(Vec<Solution>),
    /// Array of record objects, or an object whose values are records.
    Records(Value),
}

/// Execution backend.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Capability class.
    fn kind(&self) -> EngineKind;

    /// Whether the backend can currently serve queries.
    async fn health_check(&self) -> Result<bool>;

    /// Runs `query` and returns its raw output.
    async fn execute(&self, query: &str) -> Result<EngineOutput>;
}

/// Lazy sequence of binding rows.
///
/// Rows are transcoded on demand; an item error aborts the sequence for the
/// consumer that sees it.
pub struct BindingStream {
    inner: Box<dyn Iterator<Item = Result<BindingRow>> + Send>,
}

impl BindingStream {
    /// Wraps an iterator of rows.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<BindingRow>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    /// Stream over already materialized rows.
    pub fn from_rows(rows: Vec<BindingRow>) -> Self {
        Self::new(rows.into_iter().map(Ok))
    }

    /// Empty stream.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Collects every row, stopping at the first error.
    pub fn collect_rows(self) -> Result<Vec<BindingRow>> {
        self.collect()
    }
}

impl Iterator for BindingStream {
    type Item = Result<BindingRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for BindingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingStream").finish_non_exhaustive()
    }
}

/// How the adapter chooses a backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSelection {
    /// Primary when its probe succeeds, fallback otherwise.
    #[default]
    Auto,
    /// Always the primary backend.
    Primary,
    /// Always the fallback backend.
    Fallback,
}

/// Data loaded into the embedded primary store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// RDF files loaded at creation; format follows the file extension.
    pub data: Vec<PathBuf>,
    /// Base IRI for relative IRIs in the loaded files.
    pub base_iri: Option<String>,
}

/// Engine adapter configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend selection policy.
    pub backend: EngineSelection,
    /// Primary store contents.
    pub store: StoreConfig,
}

/// Chooses and runs a backend per call.
///
/// The adapter is built once by the host and shared by reference. The
/// primary backend is created on first use behind a single-flight cell and
/// reused until [`EngineAdapter::dispose`]; its availability probe runs once.
pub struct EngineAdapter {
    config: EngineConfig,
    primary: OnceCell<Arc<dyn QueryEngine>>,
    probe: OnceCell<bool>,
    fallback: Option<Arc<dyn QueryEngine>>,
}

impl EngineAdapter {
    /// Adapter whose primary backend is an [`OxigraphEngine`] built from
    /// `config.store` on first use.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            primary: OnceCell::new(),
            probe: OnceCell::new(),
            fallback: None,
        }
    }

    /// Uses an already constructed primary backend instead of building one.
    pub fn with_primary(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.primary = OnceCell::new_with(Some(engine));
        self
    }

    /// Registers the fallback backend.
    pub fn with_fallback(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.fallback = Some(engine);
        self
    }

    /// Adapter configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Primary backend, created on first call.
    pub async fn primary(&self) -> Result<Arc<dyn QueryEngine>> {
        self.primary
            .get_or_try_init(|| async {
                let engine = OxigraphEngine::from_config(&self.config.store).await?;
                tracing::info!(
                    engine = engine.name(),
                    files = self.config.store.data.len(),
                    "primary engine created"
                );
                Ok::<Arc<dyn QueryEngine>, PipelineError>(Arc::new(engine))
            })
            .await
            .cloned()
    }

    /// Whether the primary backend is usable; probed once and cached.
    pub async fn primary_available(&self) -> bool {
        *self
            .probe
            .get_or_init(|| async {
                let available = match self.primary().await {
                    Ok(engine) => match engine.health_check().await {
                        Ok(healthy) => healthy,
                        Err(err) => {
                            tracing::warn!(%err, "primary engine health check failed");
                            false
                        }
                    },
                    Err(err) => {
                        tracing::warn!(%err, "primary engine unavailable");
                        false
                    }
                };
                tracing::debug!(available, "primary engine probe cached");
                available
            })
            .await
    }

    /// Name of the backend the next call without an explicit engine would use.
    pub async fn active_engine_name(&self) -> Option<&'static str> {
        self.select().await.ok().map(|engine| engine.name())
    }

    /// Runs `query` and normalizes the output into rows.
    ///
    /// An explicitly supplied engine is used as is. Otherwise the selection
    /// policy applies. Backend failures surface as
    /// [`PipelineError::QueryExecutionFailed`] before any row is produced.
    pub async fn execute(
        &self,
        query: &str,
        engine: Option<&dyn QueryEngine>,
    ) -> Result<BindingStream> {
        match engine {
            Some(engine) => run(engine, query).await,
            None => {
                let engine = self.select().await?;
                run(engine.as_ref(), query).await
            }
        }
    }

    /// Drops the cached primary backend.
    pub fn dispose(&mut self) {
        if let Some(engine) = self.primary.take() {
            tracing::info!(engine = engine.name(), "primary engine disposed");
        }
        self.probe.take();
    }

    async fn select(&self) -> Result<Arc<dyn QueryEngine>> {
        match self.config.backend {
            EngineSelection::Primary => self.primary().await,
            EngineSelection::Fallback => self.fallback_engine(),
            EngineSelection::Auto => {
                if self.primary_available().await {
                    self.primary().await
                } else {
                    self.fallback_engine()
                }
            }
        }
    }

    fn fallback_engine(&self) -> Result<Arc<dyn QueryEngine>> {
        self.fallback.clone().ok_or_else(|| {
            PipelineError::QueryExecutionFailed("no execution backend available".into())
        })
    }
}

impl fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("config", &self.config)
            .field("primary_created", &self.primary.initialized())
            .field("probe", &self.probe.get())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

async fn run(engine: &dyn QueryEngine, query: &str) -> Result<BindingStream> {
    tracing::debug!(engine = engine.name(), kind = ?engine.kind(), "executing query");
    let output = engine.execute(query).await.map_err(|err| match err {
        PipelineError::QueryExecutionFailed(_) => err,
        other => PipelineError::execution(other),
    })?;
    Ok(match output {
        EngineOutput::Solutions(solutions) => solutions_to_rows(solutions),
        EngineOutput::Records(records) => records_to_rows(records),
    })
}
