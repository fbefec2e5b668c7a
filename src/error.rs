//! Error taxonomy shared by every pipeline stage.

#![forbid(unsafe_code)]

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::shape::ValidationIssue;

/// Convenience alias used across the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Status used when a policy denies access without supplying its own hint.
pub const DEFAULT_FORBIDDEN_STATUS: u16 = 403;

/// Errors raised while building, executing, authorizing or shaping a query.
///
/// Every variant maps to a wire name and an HTTP-style status through
/// [`PipelineError::name`] and [`PipelineError::status`], so transports never
/// have to inspect messages to pick a response code.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    /// Request arrived with a transport method other than POST.
    #[error("method {method} is not allowed; use POST")]
    MethodNotAllowed {
        /// Method the client used.
        method: String,
    },
    /// Requested operation is missing or not registered.
    #[error("{}", OperationName(.name.as_deref()))]
    OperationNotFound {
        /// Operation named by the request, if any.
        name: Option<String>,
    },
    /// Request envelope, params or result failed schema validation.
    #[error("{message}")]
    Validation {
        /// Human-readable summary.
        message: String,
        /// Structured issues, rendered verbatim in the error envelope.
        issues: Option<Value>,
    },
    /// Authorization policy rejected the operation or a row.
    #[error("{message}")]
    Forbidden {
        /// Human-readable reason.
        message: String,
        /// Status hint for the transport.
        status: u16,
    },
    /// Row shaping was attempted on a builder without an output spec.
    #[error("query builder has no output spec")]
    OutputSpecMissing,
    /// A second output spec was attached to the same builder.
    #[error("query builder already carries an output spec")]
    OutputSpecAlreadySet,
    /// A row carried no binding for the output spec's focus variable.
    #[error("row has no binding for focus variable ?{variable}")]
    MissingFocusNode {
        /// Focus variable name without the leading `?`.
        variable: String,
    },
    /// A term kind outside named node, variable, blank node and literal.
    #[error("unsupported term kind '{kind}'")]
    UnsupportedTermKind {
        /// Offending kind as reported by its source.
        kind: String,
    },
    /// A term is malformed and cannot be written into query text.
    #[error("invalid term '{term}': {reason}")]
    InvalidTerm {
        /// Raw term text.
        term: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The reconstructed local graph did not conform to the declared shape.
    #[error("focus node {focus} does not conform to shape {shape}")]
    ShapeValidationFailed {
        /// Focus node rendered in N-Triples form.
        focus: String,
        /// Shape the node was validated against.
        shape: String,
        /// Individual constraint violations.
        issues: Vec<ValidationIssue>,
    },
    /// A named shape reference could not be resolved.
    #[error("unknown shape '{0}'")]
    UnknownShape(String),
    /// The execution backend failed; carries the backend message.
    #[error("query execution failed: {0}")]
    QueryExecutionFailed(String),
    /// Mapping a validated row into its DTO failed.
    #[error("failed to map row: {0}")]
    Mapping(String),
    /// Catch-all for unexpected failures.
    #[error("{0}")]
    Server(String),
}

struct OperationName<'a>(Option<&'a str>);

impl fmt::Display for OperationName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(name) => write!(f, "unknown operation '{name}'"),
            None => write!(f, "request does not name an operation"),
        }
    }
}

impl PipelineError {
    /// Builds a [`PipelineError::Validation`] without structured issues.
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation {
            message: message.into(),
            issues: None,
        }
    }

    /// Builds a [`PipelineError::Forbidden`] carrying the default 403 hint.
    pub fn forbidden(message: impl Into<String>) -> Self {
        PipelineError::Forbidden {
            message: message.into(),
            status: DEFAULT_FORBIDDEN_STATUS,
        }
    }

    /// Builds a [`PipelineError::QueryExecutionFailed`] from any displayable error.
    pub fn execution(err: impl fmt::Display) -> Self {
        PipelineError::QueryExecutionFailed(err.to_string())
    }

    /// Builds a [`PipelineError::UnsupportedTermKind`].
    pub fn unsupported_term(kind: impl Into<String>) -> Self {
        PipelineError::UnsupportedTermKind { kind: kind.into() }
    }

    /// Builds a [`PipelineError::InvalidTerm`].
    pub fn invalid_term(term: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::InvalidTerm {
            term: term.into(),
            reason: reason.into(),
        }
    }

    /// Wire name rendered in the error envelope.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineError::MethodNotAllowed { .. } => "MethodNotAllowed",
            PipelineError::OperationNotFound { .. } => "OperationNotFound",
            PipelineError::Validation { .. } => "ValidationError",
            PipelineError::Forbidden { .. } => "Forbidden",
            PipelineError::OutputSpecMissing => "OutputSpecMissing",
            PipelineError::MissingFocusNode { .. } => "MissingFocusNode",
            PipelineError::QueryExecutionFailed(_) => "QueryExecutionFailed",
            PipelineError::OutputSpecAlreadySet
            | PipelineError::UnsupportedTermKind { .. }
            | PipelineError::InvalidTerm { .. }
            | PipelineError::ShapeValidationFailed { .. }
            | PipelineError::UnknownShape(_)
            | PipelineError::Mapping(_)
            | PipelineError::Server(_) => "ServerError",
        }
    }

    /// Status explicitly hinted by the error, if any.
    pub fn status_hint(&self) -> Option<u16> {
        match self {
            PipelineError::MethodNotAllowed { .. } => Some(405),
            PipelineError::OperationNotFound { .. } => Some(404),
            PipelineError::Forbidden { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Status the transport should respond with.
    ///
    /// Falls back to 400 for validation errors and 500 for everything else.
    pub fn status(&self) -> u16 {
        match self.status_hint() {
            Some(status) => status,
            None if self.is_validation() => 400,
            None => 500,
        }
    }

    /// Whether the error is a schema validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation { .. })
    }

    /// Structured issues rendered alongside the message, if any.
    pub fn issues(&self) -> Option<Value> {
        match self {
            PipelineError::Validation { issues, .. } => issues.clone(),
            PipelineError::ShapeValidationFailed { issues, .. } => serde_json::to_value(issues).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let cases = [
            (
                PipelineError::MethodNotAllowed {
                    method: "GET".into(),
                },
                405,
            ),
            (PipelineError::OperationNotFound { name: None }, 404),
            (PipelineError::validation("bad params"), 400),
            (PipelineError::forbidden("nope"), 403),
            (PipelineError::OutputSpecMissing, 500),
            (
                PipelineError::MissingFocusNode {
                    variable: "s".into(),
                },
                500,
            ),
            (PipelineError::execution("connection refused"), 500),
            (PipelineError::Server("boom".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn forbidden_reuses_caller_status() {
        let err = PipelineError::Forbidden {
            message: "payment required".into(),
            status: 402,
        };
        assert_eq!(err.status(), 402);
        assert_eq!(err.name(), "Forbidden");
    }

    #[test]
    fn operation_not_found_messages() {
        let missing = PipelineError::OperationNotFound { name: None };
        assert_eq!(missing.to_string(), "request does not name an operation");
        let unknown = PipelineError::OperationNotFound {
            name: Some("listPeople".into()),
        };
        assert_eq!(unknown.to_string(), "unknown operation 'listPeople'");
    }

    #[test]
    fn unexpected_errors_render_as_server_errors() {
        assert_eq!(PipelineError::Mapping("x".into()).name(), "ServerError");
        assert_eq!(PipelineError::UnknownShape("ex:S".into()).name(), "ServerError");
    }
}
