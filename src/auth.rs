//! Operation-level and row-level authorization.
//!
//! A policy sees the request context twice: once with the analysis of the
//! built query, before anything runs, and once per result row with the
//! row's reconstructed quads. Row denials only drop the row.
//!
//! Namespaces carried by a request can only narrow what the configured
//! allow-list grants, never widen it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{PipelineError, Result, DEFAULT_FORBIDDEN_STATUS};
use crate::query::Analysis;
use crate::term::Quad;

/// Per-request facts a policy may consult.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Namespaces the caller asks to be limited to; `None` applies the
    /// policy's allow-list unchanged.
    pub allowed_namespaces: Option<Vec<String>>,
}

impl RequestContext {
    /// Context with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the caller to `namespaces` within the policy's allow-list.
    pub fn with_allowed_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    /// Parses a comma-separated namespace list, ignoring blank entries.
    pub fn parse_namespace_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Caller-supplied authorization policy.
#[async_trait]
pub trait AuthorizationPolicy: Send + Sync {
    /// Checks the query as a whole before execution.
    async fn authorize_operation(&self, ctx: &RequestContext, analysis: &Analysis) -> Result<()>;

    /// Checks one row through its reconstructed quads.
    async fn authorize_row(&self, ctx: &RequestContext, quads: &[Quad]) -> Result<()>;
}

/// Allow-list settings as they appear in configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AllowListConfig {
    /// Namespaces readers may access.
    pub namespaces: Vec<String>,
    /// Status reported on denial; must be a client or server error.
    #[validate(range(min = 400, max = 599))]
    pub status: u16,
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            status: DEFAULT_FORBIDDEN_STATUS,
        }
    }
}

/// Grants access to IRIs starting with one of the configured namespaces.
///
/// When the request context lists namespaces, an IRI must also start with
/// one of those. The operation check covers every IRI the query references. The row check
/// covers each quad's predicate and its graph when the graph is a named
/// node; subjects and objects are data, not schema, and are not checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceAllowList {
    defaults: Vec<String>,
    status: u16,
}

impl NamespaceAllowList {
    /// Policy allowing IRIs under `defaults`.
    pub fn new<I, S>(defaults: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            defaults: defaults.into_iter().map(Into::into).collect(),
            status: DEFAULT_FORBIDDEN_STATUS,
        }
    }

    /// Policy built from configuration.
    pub fn from_config(config: &AllowListConfig) -> Self {
        Self::new(config.namespaces.iter().cloned()).with_status(config.status)
    }

    /// Overrides the denial status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Configured namespaces.
    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    fn check(&self, ctx: &RequestContext, iri: &str) -> Result<()> {
        let under = |namespaces: &[String]| namespaces.iter().any(|ns| iri.starts_with(ns.as_str()));
        let requested = ctx.allowed_namespaces.as_deref().map_or(true, under);
        if under(&self.defaults) && requested {
            Ok(())
        } else {
            Err(PipelineError::Forbidden {
                message: format!("access to <{iri}> is not allowed"),
                status: self.status,
            })
        }
    }
}

#[async_trait]
impl AuthorizationPolicy for NamespaceAllowList {
    async fn authorize_operation(&self, ctx: &RequestContext, analysis: &Analysis) -> Result<()> {
        for iri in &analysis.used_iris {
            self.check(ctx, iri)?;
        }
        Ok(())
    }

    async fn authorize_row(&self, ctx: &RequestContext, quads: &[Quad]) -> Result<()> {
        for quad in quads {
            if let Some(iri) = quad.predicate.as_iri() {
                self.check(ctx, iri)?;
            }
            if let Some(iri) = quad.graph.as_ref().and_then(|graph| graph.as_iri()) {
                self.check(ctx, iri)?;
            }
        }
        Ok(())
    }
}
