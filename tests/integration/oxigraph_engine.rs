#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;

use shapeline::engine::{
    EngineAdapter, EngineConfig, EngineSelection, OxigraphEngine, QueryEngine, RecordEngine,
    StoreConfig,
};
use shapeline::term::XSD_STRING;
use shapeline::PipelineError;
use tempfile::tempdir;

const BOOKS: &str = r#"
    @prefix ex: <http://example.org/> .
    @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
    ex:b1 ex:title "Dune" ; ex:pages "412"^^xsd:integer .
    ex:b2 ex:title "Solaris" .
"#;

fn store_with_books() -> (tempfile::TempDir, StoreConfig) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.ttl");
    fs::write(&path, BOOKS).unwrap();
    let config = StoreConfig {
        data: vec![path],
        base_iri: None,
    };
    (dir, config)
}

#[tokio::test]
async fn loads_files_listed_in_config() {
    let (_dir, config) = store_with_books();
    let engine = OxigraphEngine::from_config(&config).await.unwrap();
    assert_eq!(engine.store().len().unwrap(), 3);
    assert!(engine.health_check().await.unwrap());
}

#[tokio::test]
async fn unknown_extension_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("books.unknown");
    fs::write(&path, BOOKS).unwrap();
    let engine = OxigraphEngine::in_memory().unwrap();
    let err = engine.load_file(&path, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::QueryExecutionFailed(_)));
}

#[tokio::test]
async fn auto_selection_prefers_the_store() {
    let (_dir, store) = store_with_books();
    let adapter = EngineAdapter::new(EngineConfig {
        backend: EngineSelection::Auto,
        store,
    })
    .with_fallback(Arc::new(RecordEngine::fixed("records", serde_json::json!([]))));
    assert_eq!(adapter.active_engine_name().await, Some("oxigraph"));
    assert!(adapter.primary_available().await);

    let rows = adapter
        .execute(
            "SELECT ?title ?pages WHERE { ?b <http://example.org/title> ?title . \
             OPTIONAL { ?b <http://example.org/pages> ?pages } } ORDER BY ?title",
            None,
        )
        .await
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value("title"), Some("Dune"));
    assert_eq!(rows[0].value("pages"), Some("412"));
    assert_eq!(rows[1].value("title"), Some("Solaris"));
    assert!(rows[1].get("pages").is_none());

    let title = rows[0].get("title").unwrap();
    assert_eq!(title.effective_datatype(), Some(XSD_STRING));
}

#[tokio::test]
async fn ask_yields_a_single_result_row() {
    let (_dir, store) = store_with_books();
    let adapter = EngineAdapter::new(EngineConfig {
        backend: EngineSelection::Primary,
        store,
    });
    let rows = adapter
        .execute("ASK { ?b <http://example.org/title> \"Dune\" }", None)
        .await
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("result"), Some("true"));
}

#[tokio::test]
async fn missing_data_file_makes_primary_unavailable() {
    let adapter = EngineAdapter::new(EngineConfig {
        backend: EngineSelection::Auto,
        store: StoreConfig {
            data: vec!["/nonexistent/shapeline/data.ttl".into()],
            base_iri: None,
        },
    })
    .with_fallback(Arc::new(RecordEngine::fixed(
        "records",
        serde_json::json!([{"title": "Dune"}]),
    )));
    assert!(!adapter.primary_available().await);
    assert_eq!(adapter.active_engine_name().await, Some("records"));

    let rows = adapter
        .execute("SELECT * WHERE { ?s ?p ?o }", None)
        .await
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows[0].value("title"), Some("Dune"));
}
