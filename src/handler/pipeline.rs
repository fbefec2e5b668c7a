//! The per-request pipeline between a built query and its DTOs.

use crate::auth::{AuthorizationPolicy, RequestContext};
use crate::engine::EngineAdapter;
use crate::error::Result;
use crate::output::OutputSpec;
use crate::query::{analyze, QueryBuilder, QuerySerializer};
use crate::shape::ShapeValidator;
use crate::shaper::{require_output_spec, validate_and_map, RowOutcome};
use crate::term::BindingRow;

/// Collaborators borrowed for the duration of one request.
#[derive(Clone, Copy)]
pub struct PipelineServices<'a> {
    /// Execution backends.
    pub adapter: &'a EngineAdapter,
    /// Shape validator for rows.
    pub validator: &'a dyn ShapeValidator,
    /// Authorization policy, when configured.
    pub policy: Option<&'a dyn AuthorizationPolicy>,
    /// Renders the built query into backend text.
    pub serializer: &'a dyn QuerySerializer,
    /// Facts about the caller.
    pub context: &'a RequestContext,
}

/// Analyzes, authorizes, executes and shapes `builder`.
///
/// Whole-request failures abort. Inside the row loop a denied or invalid row
/// is logged and dropped; later rows still run, in arrival order.
pub async fn run_pipeline<T>(
    services: &PipelineServices<'_>,
    builder: &QueryBuilder<T>,
) -> Result<Vec<T>>
where
    T: Send,
{
    let ast = builder.to_ast()?;
    let analysis = analyze(&ast);
    tracing::debug!(used_iris = analysis.used_iris.len(), "query analyzed");

    if let Some(policy) = services.policy {
        policy.authorize_operation(services.context, &analysis).await?;
    }

    let text = services.serializer.serialize(&ast)?;
    let rows = services.adapter.execute(&text, None).await?;
    let spec = require_output_spec(builder)?;

    let mut kept = Vec::new();
    let mut skipped = 0usize;
    for (index, row) in rows.enumerate() {
        match shape_row(services, spec, &row?).await {
            RowOutcome::Kept(dto) => kept.push(dto),
            RowOutcome::Skipped(err) => {
                skipped += 1;
                tracing::warn!(row = index, error = err.name(), %err, "row skipped");
            }
        }
    }
    tracing::debug!(kept = kept.len(), skipped, "rows shaped");
    Ok(kept)
}

async fn shape_row<T>(
    services: &PipelineServices<'_>,
    spec: &OutputSpec<T>,
    row: &BindingRow,
) -> RowOutcome<T> {
    let quads = spec.build_quads(row);
    if let Some(policy) = services.policy {
        if let Err(err) = policy.authorize_row(services.context, &quads).await {
            return RowOutcome::Skipped(err);
        }
    }
    match validate_and_map(spec, services.validator, row, &quads).await {
        Ok(dto) => RowOutcome::Kept(dto),
        Err(err) => RowOutcome::Skipped(err),
    }
}
