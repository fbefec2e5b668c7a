//! Validation and mapping of result rows into DTOs.
//!
//! [`shape_one`] and [`shape_all`] run the same steps per row but differ in
//! how they treat a row that fails validation: the former returns the
//! failure, the latter logs it and leaves the row out. Structural failures
//! (no output spec, no focus binding, a broken row stream) abort both.

use crate::error::{PipelineError, Result};
use crate::output::OutputSpec;
use crate::query::QueryBuilder;
use crate::shape::ShapeValidator;
use crate::term::{BindingRow, Quad, Term};

/// Result of pushing one row through a fallible step sequence.
#[derive(Debug)]
pub enum RowOutcome<T> {
    /// Row produced a DTO.
    Kept(T),
    /// Row was dropped; carries the failure that caused it.
    Skipped(PipelineError),
}

impl<T> RowOutcome<T> {
    /// Whether the row was dropped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, RowOutcome::Skipped(_))
    }
}

/// Output spec of `builder`, or [`PipelineError::OutputSpecMissing`].
pub fn require_output_spec<T>(builder: &QueryBuilder<T>) -> Result<&OutputSpec<T>> {
    builder.output_spec().ok_or(PipelineError::OutputSpecMissing)
}

/// Term bound to the spec's focus variable in `row`.
pub fn focus_node<T>(spec: &OutputSpec<T>, row: &BindingRow) -> Result<Term> {
    row.get(spec.focus_variable())
        .cloned()
        .ok_or_else(|| PipelineError::MissingFocusNode {
            variable: spec.focus_variable().to_owned(),
        })
}

/// Validates already reconstructed `quads` for `row` and maps it.
pub async fn validate_and_map<T>(
    spec: &OutputSpec<T>,
    validator: &dyn ShapeValidator,
    row: &BindingRow,
    quads: &[Quad],
) -> Result<T> {
    let focus = focus_node(spec, row)?;
    let report = validator.validate(quads, spec.shape(), &focus).await?;
    if !report.conforms {
        return Err(PipelineError::ShapeValidationFailed {
            focus: focus.to_string(),
            shape: spec.shape().to_string(),
            issues: report.issues,
        });
    }
    spec.map_to_object(row)
}

/// Shapes a single row; every failure is returned to the caller.
pub async fn shape_one<T>(
    builder: &QueryBuilder<T>,
    validator: &dyn ShapeValidator,
    row: &BindingRow,
) -> Result<T> {
    let spec = require_output_spec(builder)?;
    let quads = spec.build_quads(row);
    validate_and_map(spec, validator, row, &quads).await
}

/// Shapes rows in arrival order, leaving out rows that fail validation or
/// mapping.
pub async fn shape_all<T, I>(
    builder: &QueryBuilder<T>,
    validator: &dyn ShapeValidator,
    rows: I,
) -> Result<Vec<T>>
where
    I: IntoIterator<Item = Result<BindingRow>>,
{
    let spec = require_output_spec(builder)?;
    let mut out = Vec::new();
    for (index, row) in rows.into_iter().enumerate() {
        let row = row?;
        let quads = spec.build_quads(&row);
        match skip_row_failure(validate_and_map(spec, validator, &row, &quads).await)? {
            RowOutcome::Kept(value) => out.push(value),
            RowOutcome::Skipped(err) => {
                tracing::warn!(row = index, %err, "row failed validation; skipping");
            }
        }
    }
    Ok(out)
}

/// Turns per-row failures into [`RowOutcome::Skipped`], keeping structural
/// failures as errors.
pub fn skip_row_failure<T>(result: Result<T>) -> Result<RowOutcome<T>> {
    match result {
        Ok(value) => Ok(RowOutcome::Kept(value)),
        Err(
            err @ (PipelineError::ShapeValidationFailed { .. }
            | PipelineError::Mapping(_)
            | PipelineError::Forbidden { .. }),
        ) => Ok(RowOutcome::Skipped(err)),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ShapeRef;
    use crate::shape::{PropertyConstraint, ShapeDescription, ShapeEngine};
    use serde_json::{json, Value};

    const NAME: &str = "http://schema.org/name";

    fn builder() -> QueryBuilder<Value> {
        let builder = QueryBuilder::new()
            .select_variables(["p", "name"])
            .optional_triple("?p", NAME, "?name");
        let shape = ShapeRef::inline(
            ShapeDescription::new().property(PropertyConstraint::new(NAME).required()),
        );
        let spec = OutputSpec::from_patterns(shape, "p", builder.patterns(), |row| {
            Ok(json!({"name": row.value("name")}))
        });
        builder.set_output_spec(spec)
    }

    fn row(id: &str, name: Option<&str>) -> BindingRow {
        let mut row = BindingRow::new().with("p", Term::named(format!("http://x/{id}")));
        if let Some(name) = name {
            row.insert("name", Term::literal(name));
        }
        row
    }

    #[tokio::test]
    async fn shape_one_propagates_and_shape_all_swallows() {
        let builder = builder();
        let validator = ShapeEngine::new();
        let bad = row("a", None);

        let err = shape_one(&builder, &validator, &bad).await.unwrap_err();
        assert!(matches!(err, PipelineError::ShapeValidationFailed { .. }));

        let all = shape_all(&builder, &validator, vec![Ok(bad), Ok(row("b", Some("Bob")))])
            .await
            .unwrap();
        assert_eq!(all, vec![json!({"name": "Bob"})]);
    }

    #[tokio::test]
    async fn missing_focus_aborts_shape_all() {
        let builder = builder();
        let rows = vec![
            Ok(row("a", Some("Alice"))),
            Ok(BindingRow::new().with("name", Term::literal("orphan"))),
        ];
        let err = shape_all(&builder, &ShapeEngine::new(), rows).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingFocusNode { ref variable } if variable == "p"));
    }

    #[tokio::test]
    async fn missing_output_spec_fails_immediately() {
        let builder = QueryBuilder::<Value>::new();
        let err = shape_one(&builder, &ShapeEngine::new(), &row("a", None))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputSpecMissing));
        let err = shape_all(&builder, &ShapeEngine::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::OutputSpecMissing));
    }

    #[tokio::test]
    async fn stream_errors_abort() {
        let rows = vec![
            Ok(row("a", Some("Alice"))),
            Err(PipelineError::execution("socket closed")),
        ];
        let err = shape_all(&builder(), &ShapeEngine::new(), rows).await.unwrap_err();
        assert!(matches!(err, PipelineError::QueryExecutionFailed(_)));
    }

    #[test]
    fn structural_failures_are_not_skipped() {
        assert!(skip_row_failure::<()>(Err(PipelineError::Mapping("x".into())))
            .unwrap()
            .is_skipped());
        assert!(skip_row_failure::<()>(Err(PipelineError::UnknownShape("s".into()))).is_err());
    }
}
