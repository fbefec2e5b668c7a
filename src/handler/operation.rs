//! Typed operations and their registry.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use validator::Validate;

use super::pipeline::{run_pipeline, PipelineServices};
use crate::error::{PipelineError, Result};
use crate::query::QueryBuilder;

type BuildFn<P, T> = dyn Fn(P) -> Result<QueryBuilder<T>> + Send + Sync;

/// Operation with its parameter and DTO types erased, as stored in an
/// [`OperationRegistry`].
#[async_trait]
pub trait ErasedOperation: Send + Sync {
    /// Registry key.
    fn name(&self) -> &str;

    /// Validates `params`, builds and runs the query and returns the
    /// serialized DTOs.
    async fn run(&self, params: Value, services: &PipelineServices<'_>) -> Result<Vec<Value>>;
}

/// Operation typed over its params `P` and DTO `T`.
///
/// Params are deserialized and checked with [`Validate`] before `build`
/// runs; every DTO is checked again before it is serialized.
pub struct Operation<P, T> {
    name: String,
    build: Box<BuildFn<P, T>>,
    _types: PhantomData<fn(P) -> T>,
}

impl<P, T> Operation<P, T> {
    /// Operation `name` whose query is produced by `build`.
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(P) -> Result<QueryBuilder<T>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
            _types: PhantomData,
        }
    }
}

impl<P, T> fmt::Debug for Operation<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<P, T> ErasedOperation for Operation<P, T>
where
    P: DeserializeOwned + Validate + Send + 'static,
    T: Serialize + Validate + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, params: Value, services: &PipelineServices<'_>) -> Result<Vec<Value>> {
        let params: P = serde_json::from_value(params).map_err(|err| PipelineError::Validation {
            message: format!("invalid params for '{}'", self.name),
            issues: Some(serde_json::json!([{ "path": "params", "message": err.to_string() }])),
        })?;
        params.validate().map_err(|errors| PipelineError::Validation {
            message: format!("params for '{}' failed validation", self.name),
            issues: serde_json::to_value(&errors).ok(),
        })?;

        let builder = (self.build)(params)?;
        let dtos = run_pipeline(services, &builder).await?;

        for (index, dto) in dtos.iter().enumerate() {
            dto.validate().map_err(|errors| PipelineError::Validation {
                message: format!("result item {index} of '{}' failed validation", self.name),
                issues: serde_json::to_value(&errors).ok(),
            })?;
        }
        dtos.iter()
            .map(|dto| serde_json::to_value(dto).map_err(|err| PipelineError::Mapping(err.to_string())))
            .collect()
    }
}

/// Operations addressable by name.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: BTreeMap<String, Arc<dyn ErasedOperation>>,
}

impl OperationRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `operation`, replacing one with the same name.
    pub fn register<O>(&mut self, operation: O) -> &mut Self
    where
        O: ErasedOperation + 'static,
    {
        self.register_arc(Arc::new(operation))
    }

    /// Registers an already shared operation.
    pub fn register_arc(&mut self, operation: Arc<dyn ErasedOperation>) -> &mut Self {
        let name = operation.name().to_owned();
        if self.operations.insert(name.clone(), operation).is_some() {
            tracing::warn!(operation = %name, "operation re-registered; previous definition replaced");
        }
        self
    }

    /// Builder-style [`OperationRegistry::register`].
    pub fn with<O>(mut self, operation: O) -> Self
    where
        O: ErasedOperation + 'static,
    {
        self.register(operation);
        self
    }

    /// Operation registered as `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ErasedOperation>> {
        self.operations.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operation is registered.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}
