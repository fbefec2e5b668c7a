//! Request and response envelopes.

use serde_json::{json, Map, Value};

use super::HandlerResponse;
use crate::error::{PipelineError, Result};

/// Decoded request envelope `{operation, params?}`.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestEnvelope {
    /// Operation name; `None` when the field is absent or null.
    pub operation: Option<String>,
    /// Untyped params, `{}` when absent or null.
    pub params: Value,
}

impl RequestEnvelope {
    /// Parses a request body.
    ///
    /// The body must be a JSON object and `operation`, when present, a
    /// string. Anything else is a validation error.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body).map_err(|err| PipelineError::Validation {
            message: "request body is not valid JSON".into(),
            issues: Some(json!([{ "path": "", "message": err.to_string() }])),
        })?;
        let Value::Object(mut fields) = value else {
            return Err(PipelineError::Validation {
                message: "request body must be a JSON object".into(),
                issues: Some(json!([{ "path": "", "message": "expected object" }])),
            });
        };
        let operation = match fields.remove("operation") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(_) => {
                return Err(PipelineError::Validation {
                    message: "field 'operation' must be a string".into(),
                    issues: Some(json!([{ "path": "operation", "message": "expected string" }])),
                })
            }
        };
        let params = match fields.remove("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params,
        };
        Ok(Self { operation, params })
    }
}

/// `{data, meta: {operation}}` with status 200.
pub fn success(operation: &str, data: Vec<Value>) -> HandlerResponse {
    HandlerResponse {
        status: 200,
        body: json!({
            "data": data,
            "meta": { "operation": operation },
        }),
    }
}

/// `{error: {name, message, issues?}, meta?: {operation}}` with the error's
/// status.
pub fn failure(err: &PipelineError, operation: Option<&str>) -> HandlerResponse {
    let mut error = Map::new();
    error.insert("name".into(), Value::from(err.name()));
    error.insert("message".into(), Value::from(err.to_string()));
    if let Some(issues) = err.issues() {
        error.insert("issues".into(), issues);
    }
    let mut body = Map::new();
    body.insert("error".into(), Value::Object(error));
    if let Some(operation) = operation {
        body.insert("meta".into(), json!({ "operation": operation }));
    }
    HandlerResponse {
        status: err.status(),
        body: Value::Object(body),
    }
}
