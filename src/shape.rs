//! Shape validation of reconstructed local graphs.
//!
//! The pipeline only depends on the [`ShapeValidator`] capability. The
//! built-in [`ShapeEngine`] supports a SHACL-like subset expressed as
//! [`ShapeDescription`] values: target class, closed shapes, and per-property
//! cardinality, datatype, node kind, length and value constraints.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::term::{Quad, Term, RDF_TYPE};

/// Reference to the shape a row must satisfy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeRef {
    /// Shape registered under an IRI.
    Named(String),
    /// Shape described inline.
    Inline(ShapeDescription),
}

impl ShapeRef {
    /// Reference to the shape registered as `iri`.
    pub fn named(iri: impl Into<String>) -> Self {
        ShapeRef::Named(iri.into())
    }

    /// Inline shape.
    pub fn inline(shape: ShapeDescription) -> Self {
        ShapeRef::Inline(shape)
    }
}

impl fmt::Display for ShapeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRef::Named(iri) => write!(f, "<{iri}>"),
            ShapeRef::Inline(shape) => match &shape.name {
                Some(name) => write!(f, "inline shape '{name}'"),
                None => write!(f, "inline shape"),
            },
        }
    }
}

/// Node kinds a value may be constrained to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Named node.
    Iri,
    /// Literal.
    Literal,
    /// Blank node.
    BlankNode,
    /// Named or blank node.
    BlankNodeOrIri,
}

impl NodeKind {
    fn admits(self, term: &Term) -> bool {
        match (self, term) {
            (NodeKind::Iri, Term::NamedNode { .. }) => true,
            (NodeKind::Literal, Term::Literal { .. }) => true,
            (NodeKind::BlankNode, Term::BlankNode { .. }) => true,
            (NodeKind::BlankNodeOrIri, Term::NamedNode { .. } | Term::BlankNode { .. }) => true,
            _ => false,
        }
    }
}

/// Constraints on the values reachable from the focus node via `path`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConstraint {
    /// Predicate IRI.
    pub path: String,
    /// Minimum number of values.
    pub min_count: Option<usize>,
    /// Maximum number of values.
    pub max_count: Option<usize>,
    /// Required literal datatype IRI.
    pub datatype: Option<String>,
    /// Required node kind.
    pub node_kind: Option<NodeKind>,
    /// Minimum lexical length.
    pub min_length: Option<usize>,
    /// Maximum lexical length.
    pub max_length: Option<usize>,
    /// Lexical value that must be among the values.
    pub has_value: Option<String>,
    /// Allowed lexical values.
    #[serde(rename = "in")]
    pub allowed: Option<Vec<String>>,
}

impl PropertyConstraint {
    /// Constraint on `path` with no restrictions yet.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Requires at least one value.
    pub fn required(mut self) -> Self {
        self.min_count = Some(1);
        self
    }

    /// Allows at most one value.
    pub fn single(mut self) -> Self {
        self.max_count = Some(1);
        self
    }

    /// Requires literals of `datatype`.
    pub fn datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    /// Requires values of `kind`.
    pub fn node_kind(mut self, kind: NodeKind) -> Self {
        self.node_kind = Some(kind);
        self
    }
}

/// Declarative shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeDescription {
    /// Optional display name.
    pub name: Option<String>,
    /// Class the focus node must be typed with.
    pub target_class: Option<String>,
    /// Rejects predicates on the focus node that no constraint mentions.
    pub closed: bool,
    /// Predicates exempt from the closed check; `rdf:type` always is.
    pub ignored_properties: Vec<String>,
    /// Property constraints.
    pub properties: Vec<PropertyConstraint>,
}

impl ShapeDescription {
    /// Empty shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property constraint.
    pub fn property(mut self, constraint: PropertyConstraint) -> Self {
        self.properties.push(constraint);
        self
    }

    /// Requires the focus node to be an instance of `class`.
    pub fn target_class(mut self, class: impl Into<String>) -> Self {
        self.target_class = Some(class.into());
        self
    }

    /// Marks the shape closed.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }
}

/// One constraint violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Property path, when the violation concerns a property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Constraint component, e.g. `minCount`.
    pub constraint: String,
    /// Human-readable message.
    pub message: String,
    /// Offending value in N-Triples form, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Outcome of validating one focus node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the node conforms.
    pub conforms: bool,
    /// Violations; empty when conforming.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Report with no violations.
    pub fn conforming() -> Self {
        Self {
            conforms: true,
            issues: Vec::new(),
        }
    }

    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            conforms: issues.is_empty(),
            issues,
        }
    }
}

/// Validates quads around a focus node against a shape.
#[async_trait]
pub trait ShapeValidator: Send + Sync {
    /// Validates `quads` for `focus` against `shape`.
    ///
    /// A non-conforming graph is reported through the returned report; `Err`
    /// is reserved for failures of the validator itself, such as an unknown
    /// named shape.
    async fn validate(
        &self,
        quads: &[Quad],
        shape: &ShapeRef,
        focus: &Term,
    ) -> Result<ValidationReport>;
}

/// Named shapes available to [`ShapeRef::Named`] references.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    shapes: RwLock<HashMap<String, Arc<ShapeDescription>>>,
}

impl ShapeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces `iri`.
    pub fn register(&self, iri: impl Into<String>, shape: ShapeDescription) {
        self.shapes.write().insert(iri.into(), Arc::new(shape));
    }

    /// Shape registered as `iri`.
    pub fn get(&self, iri: &str) -> Option<Arc<ShapeDescription>> {
        self.shapes.read().get(iri).cloned()
    }

    /// Number of registered shapes.
    pub fn len(&self) -> usize {
        self.shapes.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.shapes.read().is_empty()
    }
}

/// Built-in validator for [`ShapeDescription`]s.
#[derive(Debug, Default)]
pub struct ShapeEngine {
    registry: ShapeRegistry,
}

impl ShapeEngine {
    /// Engine with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine over `registry`.
    pub fn with_registry(registry: ShapeRegistry) -> Self {
        Self { registry }
    }

    /// Named shapes known to this engine.
    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    /// Validates synchronously.
    pub fn check(&self, quads: &[Quad], shape: &ShapeRef, focus: &Term) -> Result<ValidationReport> {
        match shape {
            ShapeRef::Inline(description) => Ok(check_shape(quads, description, focus)),
            ShapeRef::Named(iri) => {
                let description = self
                    .registry
                    .get(iri)
                    .ok_or_else(|| PipelineError::UnknownShape(iri.clone()))?;
                Ok(check_shape(quads, &description, focus))
            }
        }
    }
}

#[async_trait]
impl ShapeValidator for ShapeEngine {
    async fn validate(
        &self,
        quads: &[Quad],
        shape: &ShapeRef,
        focus: &Term,
    ) -> Result<ValidationReport> {
        self.check(quads, shape, focus)
    }
}

fn check_shape(quads: &[Quad], shape: &ShapeDescription, focus: &Term) -> ValidationReport {
    let outgoing: Vec<&Quad> = quads.iter().filter(|q| &q.subject == focus).collect();
    let mut issues = Vec::new();

    if let Some(class) = &shape.target_class {
        let typed = outgoing.iter().any(|q| {
            q.predicate.as_iri() == Some(RDF_TYPE) && q.object.as_iri() == Some(class.as_str())
        });
        if !typed {
            issues.push(ValidationIssue {
                path: Some(RDF_TYPE.to_owned()),
                constraint: "class".into(),
                message: format!("focus node is not an instance of <{class}>"),
                value: None,
            });
        }
    }

    for constraint in &shape.properties {
        let values: Vec<&Term> = outgoing
            .iter()
            .filter(|q| q.predicate.as_iri() == Some(constraint.path.as_str()))
            .map(|q| &q.object)
            .collect();
        check_property(constraint, &values, &mut issues);
    }

    if shape.closed {
        for quad in &outgoing {
            let Some(predicate) = quad.predicate.as_iri() else {
                continue;
            };
            let declared = predicate == RDF_TYPE
                || shape.properties.iter().any(|c| c.path == predicate)
                || shape.ignored_properties.iter().any(|p| p == predicate);
            if !declared {
                issues.push(ValidationIssue {
                    path: Some(predicate.to_owned()),
                    constraint: "closed".into(),
                    message: format!("predicate <{predicate}> is not allowed by a closed shape"),
                    value: Some(quad.object.to_string()),
                });
            }
        }
    }

    ValidationReport::from_issues(issues)
}

fn check_property(constraint: &PropertyConstraint, values: &[&Term], issues: &mut Vec<ValidationIssue>) {
    let path = Some(constraint.path.clone());
    let mut push = |constraint_name: &str, message: String, value: Option<&Term>| {
        issues.push(ValidationIssue {
            path: path.clone(),
            constraint: constraint_name.to_owned(),
            message,
            value: value.map(ToString::to_string),
        });
    };

    if let Some(min) = constraint.min_count {
        if values.len() < min {
            push(
                "minCount",
                format!("expected at least {min} value(s), found {}", values.len()),
                None,
            );
        }
    }
    if let Some(max) = constraint.max_count {
        if values.len() > max {
            push(
                "maxCount",
                format!("expected at most {max} value(s), found {}", values.len()),
                None,
            );
        }
    }
    if let Some(expected) = &constraint.has_value {
        if !values.iter().any(|v| v.value() == expected) {
            push("hasValue", format!("missing required value '{expected}'"), None);
        }
    }

    for value in values {
        if let Some(datatype) = &constraint.datatype {
            if value.effective_datatype() != Some(datatype.as_str()) {
                push("datatype", format!("value is not a literal of <{datatype}>"), Some(value));
            }
        }
        if let Some(kind) = constraint.node_kind {
            if !kind.admits(value) {
                push("nodeKind", format!("value is not of node kind {kind:?}"), Some(value));
            }
        }
        let length = value.value().chars().count();
        if let Some(min) = constraint.min_length {
            if length < min {
                push("minLength", format!("value shorter than {min}"), Some(value));
            }
        }
        if let Some(max) = constraint.max_length {
            if length > max {
                push("maxLength", format!("value longer than {max}"), Some(value));
            }
        }
        if let Some(allowed) = &constraint.allowed {
            if !allowed.iter().any(|a| a == value.value()) {
                push("in", "value is not among the allowed values".into(), Some(value));
            }
        }
    }
}
