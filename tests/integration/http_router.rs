#![allow(missing_docs)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shapeline::config::ShapelineConfig;
use shapeline::engine::{EngineSelection, RecordEngine};
use shapeline::handler::HandlerRequest;
use shapeline::output::{OutputSpec, ShapeRef};
use shapeline::server::{build_router, ALLOWED_NAMESPACES_HEADER};
use shapeline::{EngineAdapter, Operation, OperationRegistry, QueryBuilder, RequestHandler, ShapeEngine};
use tower::ServiceExt;
use validator::Validate;

const CONFIG: &str = r#"
    [engine]
    backend = "fallback"

    [auth]
    namespaces = ["http://schema.org/"]

    [shapes."http://example.org/PersonShape"]
    properties = [{ path = "http://schema.org/name", min_count = 1 }]

    [[operations]]
    name = "listPeople"
    shape = "http://example.org/PersonShape"
    focus = "person"
    select = ["person", "name"]
    prefixes = { schema = "http://schema.org/" }
    where = [{ subject = "?person", predicate = "schema:name", object = "?name" }]

    [[operations]]
    name = "listSecrets"
    shape = "http://example.org/PersonShape"
    focus = "person"
    where = [{ subject = "?person", predicate = "<http://example.org/secret>", object = "?name" }]
"#;

fn router() -> axum::Router {
    let config: ShapelineConfig = toml::from_str(CONFIG).unwrap();
    config.check().unwrap();
    let records = json!([
        {"person": "http://example.org/alice", "name": "Alice"},
        {"person": "http://example.org/bob", "name": "Bob"}
    ]);
    let adapter = EngineAdapter::new(config.engine.clone())
        .with_fallback(Arc::new(RecordEngine::fixed("fixture", records)));
    let mut handler = RequestHandler::new(
        config.operation_registry(),
        Arc::new(adapter),
        Arc::new(ShapeEngine::with_registry(config.shape_registry())),
    );
    if let Some(policy) = config.policy() {
        handler = handler.with_policy(Arc::new(policy));
    }
    build_router(Arc::new(handler), &[])
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let response = router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_query(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

#[tokio::test]
async fn post_runs_declared_operation() {
    let (status, body) = send(post_query(r#"{"operation":"listPeople"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": [
                {"person": "http://example.org/alice", "name": "Alice"},
                {"person": "http://example.org/bob", "name": "Bob"}
            ],
            "meta": {"operation": "listPeople"}
        })
    );
}

#[tokio::test]
async fn get_on_query_is_405_envelope() {
    let request = Request::builder()
        .method("GET")
        .uri("/query")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["name"], "MethodNotAllowed");
}

fn with_namespaces(mut request: Request<Body>, namespaces: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(ALLOWED_NAMESPACES_HEADER, namespaces.parse().unwrap());
    request
}

#[tokio::test]
async fn namespace_header_narrows_configured_allow_list() {
    let request = with_namespaces(
        post_query(r#"{"operation":"listPeople"}"#),
        "http://example.org/",
    );
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["name"], "Forbidden");

    let request = with_namespaces(post_query(r#"{"operation":"listPeople"}"#), "http://");
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn namespace_header_cannot_widen_access() {
    let (status, _) = send(post_query(r#"{"operation":"listSecrets"}"#)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for namespaces in ["http://", "http://schema.org/, http://example.org/"] {
        let request = with_namespaces(post_query(r#"{"operation":"listSecrets"}"#), namespaces);
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{namespaces}");
        assert_eq!(body["error"]["name"], "Forbidden");
    }
}

#[tokio::test]
async fn malformed_body_is_400() {
    let (status, body) = send(post_query("[]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["name"], "ValidationError");
    assert!(body.get("meta").is_none());
}

#[tokio::test]
async fn unknown_operation_is_404_with_meta() {
    let (status, body) = send(post_query(r#"{"operation":"missing"}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["meta"]["operation"], "missing");
}

#[tokio::test]
async fn health_reports_active_engine() {
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "engine": "fixture"}));
}

#[derive(Debug, Deserialize, Validate)]
struct NoParams {}

#[derive(Debug, Serialize, Validate)]
struct Named {
    name: String,
}

fn names_query(_: NoParams) -> shapeline::Result<QueryBuilder<Named>> {
    let builder = QueryBuilder::new()
        .select_variables(["person", "name"])
        .where_triple("?person", "http://schema.org/name", "?name");
    let spec = OutputSpec::from_patterns(
        ShapeRef::named("http://example.org/PersonShape"),
        "person",
        builder.patterns(),
        |row| {
            Ok(Named {
                name: row.value("name").unwrap_or_default().to_owned(),
            })
        },
    );
    Ok(builder.set_output_spec(spec))
}

#[tokio::test]
async fn extra_operations_join_declared_ones() {
    let mut config: ShapelineConfig = toml::from_str(CONFIG).unwrap();
    config.engine.backend = EngineSelection::Primary;
    let extra = OperationRegistry::new().with(Operation::new("names", names_query));
    let handler = config.build_handler(extra);

    let names: Vec<&str> = handler.registry().names().collect();
    assert_eq!(names, vec!["listPeople", "listSecrets", "names"]);

    let response = handler
        .handle(HandlerRequest::post(r#"{"operation":"names"}"#))
        .await;
    assert_eq!(response.status, 200, "{}", response.body);
    assert_eq!(
        response.body,
        json!({"data": [], "meta": {"operation": "names"}})
    );
}
