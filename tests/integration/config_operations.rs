#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use serde_json::json;
use shapeline::config::ShapelineConfig;
use shapeline::handler::HandlerRequest;
use shapeline::{OperationRegistry, RequestHandler};
use tempfile::tempdir;

const DATA: &str = r#"
    @prefix schema: <http://schema.org/> .
    @prefix ex: <http://example.org/people/> .
    ex:alice a schema:Person ; schema:name "Alice" ; schema:email "alice@example.org" .
    ex:bob a schema:Person ; schema:name "Bob" .
    ex:carol a schema:Person ; schema:name "Carol" ; schema:email "carol@example.org" .
"#;

const CONFIG: &str = r#"
    log_level = "debug"

    [engine]
    backend = "auto"
    store = { data = ["people.ttl"] }

    [auth]
    namespaces = ["http://schema.org/", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"]

    [shapes."http://example.org/shapes/Contact"]
    target_class = "http://schema.org/Person"
    properties = [
        { path = "http://schema.org/name", min_count = 1, max_count = 1 },
        { path = "http://schema.org/email", min_count = 1 },
    ]

    [[operations]]
    name = "contacts"
    shape = "http://example.org/shapes/Contact"
    focus = "person"
    select = ["person", "name", "email"]
    filters = []

    [operations.prefixes]
    schema = "http://schema.org/"
    rdf = "http://www.w3.org/1999/02/22-rdf-syntax-ns#"

    [[operations.where]]
    subject = "?person"
    predicate = "rdf:type"
    object = "schema:Person"

    [[operations.where]]
    subject = "?person"
    predicate = "schema:name"
    object = "$name"

    [[operations.where]]
    subject = "?person"
    predicate = "schema:email"
    object = "?email"
    optional = true

    [[operations.params]]
    name = "name"
    max_length = 32
"#;

fn write_config(dir: &Path) -> ShapelineConfig {
    fs::write(dir.join("people.ttl"), DATA).unwrap();
    let path = dir.join("shapeline.toml");
    fs::write(&path, CONFIG).unwrap();
    ShapelineConfig::load(&path).unwrap()
}

fn handler(dir: &Path) -> RequestHandler {
    write_config(dir).build_handler(OperationRegistry::new())
}

#[test]
fn relative_data_paths_resolve_against_the_config_file() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    assert_eq!(config.engine.store.data, vec![dir.path().join("people.ttl")]);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.shape_registry().len(), 1);
    assert!(config.policy().is_some());
}

#[tokio::test]
async fn declared_operation_keeps_only_conforming_rows() {
    let dir = tempdir().unwrap();
    let response = handler(dir.path())
        .handle(HandlerRequest::post(r#"{"operation":"contacts"}"#))
        .await;
    assert_eq!(response.status, 200, "{}", response.body);

    let mut data = response.body["data"].as_array().unwrap().clone();
    data.sort_by_key(|row| row["name"].as_str().unwrap_or_default().to_owned());
    // bob has no email
    assert_eq!(
        data,
        vec![
            json!({
                "person": "http://example.org/people/alice",
                "name": "Alice",
                "email": "alice@example.org"
            }),
            json!({
                "person": "http://example.org/people/carol",
                "name": "Carol",
                "email": "carol@example.org"
            }),
        ]
    );
}

#[tokio::test]
async fn string_param_narrows_the_query() {
    let dir = tempdir().unwrap();
    let body = json!({"operation": "contacts", "params": {"name": "Carol"}});
    let response = handler(dir.path())
        .handle(HandlerRequest::post(body.to_string()))
        .await;
    assert_eq!(response.status, 200, "{}", response.body);
    // `name` is bound in the query text, so it is absent from the rows
    assert_eq!(
        response.body["data"],
        json!([{
            "person": "http://example.org/people/carol",
            "email": "carol@example.org"
        }])
    );
}

#[tokio::test]
async fn bad_params_are_reported() {
    let dir = tempdir().unwrap();
    let body = json!({"operation": "contacts", "params": {"name": 7, "extra": "x"}});
    let response = handler(dir.path())
        .handle(HandlerRequest::post(body.to_string()))
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"]["name"], "ValidationError");
    assert_eq!(response.body["error"]["issues"].as_array().unwrap().len(), 2);
}
