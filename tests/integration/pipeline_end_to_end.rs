#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use oxigraph::io::RdfFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shapeline::auth::{AuthorizationPolicy, NamespaceAllowList, RequestContext};
use shapeline::engine::{EngineAdapter, EngineConfig, EngineSelection, OxigraphEngine, RecordEngine};
use shapeline::handler::{HandlerRequest, Operation, OperationRegistry, RequestHandler};
use shapeline::output::{OutputSpec, ShapeRef};
use shapeline::query::{Analysis, QueryBuilder};
use shapeline::shape::{PropertyConstraint, ShapeDescription, ShapeEngine};
use shapeline::{PipelineError, Quad, Result};
use validator::Validate;

const EX: &str = "http://example.org/schema#";

const PEOPLE: &str = r#"
    @prefix ex: <http://example.org/schema#> .
    ex:p1 ex:id "1" ; ex:name "Alice" .
    ex:p2 ex:id "2" ; ex:name "Bob" .
    ex:p3 ex:id "3" .
"#;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct ListParams {
    #[validate(range(min = 1, max = 100))]
    limit: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
struct FieldParams {
    #[validate(length(min = 1, max = 64))]
    field: String,
}

#[derive(Debug, Serialize, Validate)]
struct Person {
    #[validate(length(min = 1))]
    id: String,
    name: String,
}

#[derive(Debug, Serialize, Validate)]
struct Item {
    #[validate(length(min = 1))]
    id: String,
}

fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

fn people_query(params: ListParams) -> Result<QueryBuilder<Person>> {
    let mut builder = QueryBuilder::new()
        .prefix("ex", EX)
        .select_variables(["person", "id", "name"])
        .where_triple("?person", ex("id"), "?id")
        .optional_triple("?person", ex("name"), "?name");
    if let Some(limit) = params.limit {
        builder = builder.limit(limit);
    }
    let shape = ShapeRef::inline(
        ShapeDescription::new()
            .property(PropertyConstraint::new(ex("id")).required().single())
            .property(PropertyConstraint::new(ex("name")).required()),
    );
    let spec = OutputSpec::from_patterns(shape, "person", builder.patterns(), |row| {
        Ok(Person {
            id: row.value("id").unwrap_or_default().to_owned(),
            name: row.value("name").unwrap_or_default().to_owned(),
        })
    });
    Ok(builder.set_output_spec(spec))
}

fn items_query(_: ListParams) -> Result<QueryBuilder<Item>> {
    let builder = QueryBuilder::new()
        .select_variables(["s", "id"])
        .where_triple("?s", ex("id"), "?id");
    let shape = ShapeRef::inline(
        ShapeDescription::new().property(PropertyConstraint::new(ex("id")).required()),
    );
    let spec = OutputSpec::from_patterns(shape, "s", builder.patterns(), |row| {
        Ok(Item {
            id: row.value("id").unwrap_or_default().to_owned(),
        })
    });
    Ok(builder.set_output_spec(spec))
}

fn field_query(params: FieldParams) -> Result<QueryBuilder<Item>> {
    let builder = QueryBuilder::new()
        .select_variables(["s", "id"])
        .where_triple("?s", ex(&params.field), "?id");
    let shape = ShapeRef::inline(ShapeDescription::new());
    let spec = OutputSpec::from_patterns(shape, "s", builder.patterns(), |row| {
        Ok(Item {
            id: row.value("id").unwrap_or_default().to_owned(),
        })
    });
    Ok(builder.set_output_spec(spec))
}

fn registry() -> OperationRegistry {
    OperationRegistry::new()
        .with(Operation::new("listPeople", people_query))
        .with(Operation::new("items", items_query))
        .with(Operation::new("byField", field_query))
        .with(Operation::new("unshaped", |_: ListParams| {
            Ok(QueryBuilder::<Item>::new().where_triple("?s", ex("id"), "?id"))
        }))
}

fn oxigraph_adapter() -> Arc<EngineAdapter> {
    let engine = OxigraphEngine::in_memory().unwrap();
    engine.load_str(PEOPLE, RdfFormat::Turtle, None).unwrap();
    Arc::new(EngineAdapter::new(EngineConfig::default()).with_primary(Arc::new(engine)))
}

fn record_adapter(records: Value, calls: Arc<AtomicUsize>) -> Arc<EngineAdapter> {
    let engine = RecordEngine::new("records", move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(records.clone())
    });
    Arc::new(
        EngineAdapter::new(EngineConfig {
            backend: EngineSelection::Fallback,
            ..EngineConfig::default()
        })
        .with_fallback(Arc::new(engine)),
    )
}

fn handler(adapter: Arc<EngineAdapter>) -> RequestHandler {
    RequestHandler::new(registry(), adapter, Arc::new(ShapeEngine::new()))
}

fn post(body: Value) -> HandlerRequest {
    HandlerRequest::post(body.to_string())
}

struct DenyObjects(Vec<&'static str>);

#[async_trait]
impl AuthorizationPolicy for DenyObjects {
    async fn authorize_operation(&self, _ctx: &RequestContext, _analysis: &Analysis) -> Result<()> {
        Ok(())
    }

    async fn authorize_row(&self, _ctx: &RequestContext, quads: &[Quad]) -> Result<()> {
        if quads.iter().any(|quad| self.0.contains(&quad.object.value())) {
            Err(PipelineError::forbidden("row denied"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn oxigraph_rows_are_validated_and_mapped() {
    let response = handler(oxigraph_adapter())
        .handle(post(json!({"operation": "listPeople"})))
        .await;
    assert_eq!(response.status, 200, "{}", response.body);
    assert_eq!(response.body["meta"]["operation"], "listPeople");

    let mut people: Vec<(String, String)> = response.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["id"].as_str().unwrap().to_owned(),
                p["name"].as_str().unwrap().to_owned(),
            )
        })
        .collect();
    people.sort();
    // p3 has no name and fails the shape
    assert_eq!(
        people,
        vec![("1".into(), "Alice".into()), ("2".into(), "Bob".into())]
    );
}

#[tokio::test]
async fn row_denial_drops_only_that_row() {
    let calls = Arc::new(AtomicUsize::new(0));
    let records = json!([
        {"s": "http://example.org/item/1", "id": "1"},
        {"s": "http://example.org/item/2", "id": "2"}
    ]);
    let handler = handler(record_adapter(records, calls.clone()))
        .with_policy(Arc::new(DenyObjects(vec!["1"])));

    let response = handler.handle(post(json!({"operation": "items"}))).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"], json!([{"id": "2"}]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn operation_denial_happens_before_execution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = handler(record_adapter(json!([]), calls.clone()))
        .with_policy(Arc::new(NamespaceAllowList::new(["http://example.org/other#"])));

    let response = handler.handle(post(json!({"operation": "items"}))).await;
    assert_eq!(response.status, 403);
    assert_eq!(response.body["error"]["name"], "Forbidden");
    assert_eq!(response.body["meta"]["operation"], "items");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn request_namespaces_only_narrow_the_allow_list() {
    let calls = Arc::new(AtomicUsize::new(0));
    let records = json!([{"s": "http://example.org/item/1", "id": "1"}]);
    let handler = handler(record_adapter(records, calls.clone()))
        .with_policy(Arc::new(NamespaceAllowList::new([EX])));

    let within = RequestContext::new().with_allowed_namespaces([EX]);
    let response = handler
        .handle(post(json!({"operation": "items"})).with_context(within))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["data"], json!([{"id": "1"}]));

    let narrower = RequestContext::new().with_allowed_namespaces(["http://example.org/other#"]);
    let response = handler
        .handle(post(json!({"operation": "items"})).with_context(narrower))
        .await;
    assert_eq!(response.status, 403);

    let closed = self::handler(record_adapter(json!([]), calls.clone()))
        .with_policy(Arc::new(NamespaceAllowList::new(Vec::<String>::new())));
    let wider = RequestContext::new().with_allowed_namespaces(["http://"]);
    let response = closed
        .handle(post(json!({"operation": "items"})).with_context(wider))
        .await;
    assert_eq!(response.status, 403);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_and_unknown_operations_are_404() {
    let handler = handler(oxigraph_adapter());
    for body in [json!({}), json!({"operation": "nope"})] {
        let response = handler.handle(post(body)).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body["error"]["name"], "OperationNotFound");
    }
}

#[tokio::test]
async fn missing_output_spec_is_500() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = handler(record_adapter(json!([]), calls.clone()));
    let response = handler.handle(post(json!({"operation": "unshaped"}))).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body["error"]["name"], "OutputSpecMissing");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn result_schema_mismatch_is_400() {
    let calls = Arc::new(AtomicUsize::new(0));
    let records = json!([{"s": "http://example.org/item/1", "id": ""}]);
    let handler = handler(record_adapter(records, calls));
    let response = handler.handle(post(json!({"operation": "items"}))).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"]["name"], "ValidationError");
}

#[tokio::test]
async fn invalid_params_are_400_with_issues() {
    let handler = handler(oxigraph_adapter());
    let response = handler
        .handle(post(json!({"operation": "listPeople", "params": {"limit": 1000}})))
        .await;
    assert_eq!(response.status, 400);
    assert!(response.body["error"]["issues"]["limit"].is_array());

    let response = handler
        .handle(post(json!({"operation": "listPeople", "params": {"bogus": true}})))
        .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn limit_param_reaches_the_engine() {
    let response = handler(oxigraph_adapter())
        .handle(post(json!({"operation": "listPeople", "params": {"limit": 1}})))
        .await;
    assert_eq!(response.status, 200);
    assert!(response.body["data"].as_array().unwrap().len() <= 1);
}

#[tokio::test]
async fn backend_failures_render_as_500() {
    let adapter = Arc::new(
        EngineAdapter::new(EngineConfig {
            backend: EngineSelection::Fallback,
            ..EngineConfig::default()
        })
        .with_fallback(Arc::new(RecordEngine::new("down", |_| {
            Err("connection refused".to_owned())
        }))),
    );
    let response = handler(adapter).handle(post(json!({"operation": "items"}))).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body["error"]["name"], "QueryExecutionFailed");
    assert!(response.body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn param_built_iris_cannot_escape_the_allow_list() {
    let calls = Arc::new(AtomicUsize::new(0));
    let records = json!([{"s": "http://example.org/item/1", "id": "1"}]);
    let handler = handler(record_adapter(records, calls.clone()))
        .with_policy(Arc::new(NamespaceAllowList::new([EX])));

    let response = handler
        .handle(post(json!({"operation": "byField", "params": {"field": "id"}})))
        .await;
    assert_eq!(response.status, 200, "{}", response.body);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let smuggled = "id> ?x . ?s <http://forbidden.example/ssn";
    let response = handler
        .handle(post(json!({"operation": "byField", "params": {"field": smuggled}})))
        .await;
    assert_eq!(response.status, 500);
    assert!(response.body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("invalid term"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
