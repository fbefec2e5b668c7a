//! Request handling: envelope in, envelope out.
//!
//! [`RequestHandler::handle`] drives one request through the pipeline:
//!
//! 1. reject anything but POST
//! 2. decode the envelope
//! 3. resolve the operation
//! 4. validate params and build the query
//! 5. authorize the operation, execute, then authorize, validate and map
//!    each row
//! 6. validate the DTOs and render the success envelope
//!
//! Any failure outside the row loop ends the request with an error
//! envelope. Transports only translate [`HandlerRequest`] and
//! [`HandlerResponse`].

mod declared;
mod envelope;
mod operation;
mod pipeline;

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Method;
use serde_json::Value;

use crate::auth::{AuthorizationPolicy, RequestContext};
use crate::engine::EngineAdapter;
use crate::error::{PipelineError, Result};
use crate::query::{QuerySerializer, SparqlSerializer};
use crate::shape::ShapeValidator;

pub use declared::{DeclaredOperation, ParamDecl, TripleTemplate};
pub use envelope::{failure, success, RequestEnvelope};
pub use operation::{ErasedOperation, Operation, OperationRegistry};
pub use pipeline::{run_pipeline, PipelineServices};

/// Transport-neutral request.
#[derive(Clone, Debug)]
pub struct HandlerRequest {
    /// Transport method.
    pub method: Method,
    /// Raw body.
    pub body: Bytes,
    /// Caller facts for authorization.
    pub context: RequestContext,
}

impl HandlerRequest {
    /// POST request with `body` and an empty context.
    pub fn post(body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            body: body.into(),
            context: RequestContext::default(),
        }
    }

    /// Replaces the context.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// Transport-neutral response.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerResponse {
    /// HTTP-style status.
    pub status: u16,
    /// Success or error envelope.
    pub body: Value,
}

/// Runs registered operations against a shared adapter.
pub struct RequestHandler {
    registry: OperationRegistry,
    adapter: Arc<EngineAdapter>,
    validator: Arc<dyn ShapeValidator>,
    policy: Option<Arc<dyn AuthorizationPolicy>>,
    serializer: Arc<dyn QuerySerializer>,
}

impl RequestHandler {
    /// Handler without an authorization policy, rendering SPARQL text.
    pub fn new(
        registry: OperationRegistry,
        adapter: Arc<EngineAdapter>,
        validator: Arc<dyn ShapeValidator>,
    ) -> Self {
        Self {
            registry,
            adapter,
            validator,
            policy: None,
            serializer: Arc::new(SparqlSerializer),
        }
    }

    /// Enables both authorization checkpoints with `policy`.
    pub fn with_policy(mut self, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Replaces the query serializer.
    pub fn with_serializer(mut self, serializer: Arc<dyn QuerySerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Registered operations.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Shared engine adapter.
    pub fn adapter(&self) -> &Arc<EngineAdapter> {
        &self.adapter
    }

    /// Disposes the adapter's primary backend when this handler is its only
    /// owner. Returns whether it did.
    pub fn dispose(&mut self) -> bool {
        match Arc::get_mut(&mut self.adapter) {
            Some(adapter) => {
                adapter.dispose();
                true
            }
            None => false,
        }
    }

    /// Handles one request. Never fails: errors become error envelopes.
    pub async fn handle(&self, request: HandlerRequest) -> HandlerResponse {
        if request.method != Method::POST {
            let err = PipelineError::MethodNotAllowed {
                method: request.method.to_string(),
            };
            return self.reject(&err, None);
        }

        let envelope = match RequestEnvelope::parse(&request.body) {
            Ok(envelope) => envelope,
            Err(err) => return self.reject(&err, None),
        };
        let name = envelope.operation.clone();

        match self.dispatch(envelope, &request.context).await {
            Ok(data) => {
                let operation = name.as_deref().unwrap_or_default();
                tracing::info!(operation, rows = data.len(), "request succeeded");
                success(operation, data)
            }
            Err(err) => self.reject(&err, name.as_deref()),
        }
    }

    async fn dispatch(
        &self,
        envelope: RequestEnvelope,
        context: &RequestContext,
    ) -> Result<Vec<Value>> {
        let operation = envelope
            .operation
            .as_deref()
            .and_then(|name| self.registry.get(name))
            .ok_or_else(|| PipelineError::OperationNotFound {
                name: envelope.operation.clone(),
            })?;

        let services = PipelineServices {
            adapter: self.adapter.as_ref(),
            validator: self.validator.as_ref(),
            policy: self.policy.as_deref(),
            serializer: self.serializer.as_ref(),
            context,
        };
        operation.run(envelope.params, &services).await
    }

    fn reject(&self, err: &PipelineError, operation: Option<&str>) -> HandlerResponse {
        let response = failure(err, operation);
        if response.status >= 500 {
            tracing::error!(operation, error = err.name(), %err, "request failed");
        } else {
            tracing::info!(
                operation,
                error = err.name(),
                status = response.status,
                %err,
                "request rejected"
            );
        }
        response
    }
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("registry", &self.registry)
            .field("adapter", &self.adapter)
            .field("has_policy", &self.policy.is_some())
            .finish_non_exhaustive()
    }
}
