use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use async_trait::async_trait;
use oxigraph::{
    io::{RdfFormat, RdfParser},
    model::Term as OxTerm,
    sparql::{QueryResults, SparqlEvaluator},
    store::Store,
};

use super::{EngineKind, EngineOutput, QueryEngine, Solution, StoreConfig};
use crate::error::{PipelineError, Result};
use crate::term::{Term, RDF_LANG_STRING, XSD_STRING};

/// Embedded Oxigraph store used as the primary backend.
///
/// SELECT queries yield typed solutions; ASK answers become a single
/// `?result` row. Evaluation runs on the blocking thread pool.
#[derive(Clone)]
pub struct OxigraphEngine {
    store: Store,
}

impl OxigraphEngine {
    /// Empty in-memory store.
    pub fn in_memory() -> Result<Self> {
        let store = Store::new().map_err(|e| {
            PipelineError::execution(format!("failed to create in-memory store: {e}"))
        })?;
        Ok(Self { store })
    }

    /// In-memory store loaded with the files listed in `config`.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let engine = Self::in_memory()?;
        for path in &config.data {
            let loaded = engine.load_file(path, config.base_iri.as_deref()).await?;
            tracing::info!(path = %path.display(), quads = loaded, "loaded RDF data");
        }
        Ok(engine)
    }

    /// Loads RDF text in `format` and returns the number of quads inserted.
    pub fn load_str(&self, data: &str, format: RdfFormat, base_iri: Option<&str>) -> Result<usize> {
        insert_all(&self.store, parser(format, base_iri)?, data.as_bytes())
    }

    /// Loads an RDF file; the format follows the file extension.
    pub async fn load_file(&self, path: &Path, base_iri: Option<&str>) -> Result<usize> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(RdfFormat::from_extension)
            .ok_or_else(|| {
                PipelineError::execution(format!(
                    "cannot infer RDF format of {}",
                    path.display()
                ))
            })?;
        let parser = parser(format, base_iri)?;
        let path = path.to_path_buf();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let file = File::open(&path).map_err(|e| {
                PipelineError::execution(format!("failed to open {}: {e}", path.display()))
            })?;
            insert_all(&store, parser, BufReader::new(file))
        })
        .await
        .map_err(|e| PipelineError::execution(format!("task join error: {e}")))?
    }

    /// Underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn parser(format: RdfFormat, base_iri: Option<&str>) -> Result<RdfParser> {
    let parser = RdfParser::from_format(format);
    match base_iri {
        Some(iri) => parser
            .with_base_iri(iri)
            .map_err(|e| PipelineError::execution(format!("invalid base IRI '{iri}': {e}"))),
        None => Ok(parser),
    }
}

fn insert_all(store: &Store, parser: RdfParser, reader: impl std::io::Read) -> Result<usize> {
    let mut count = 0;
    for quad in parser.for_reader(reader) {
        let quad = quad.map_err(|e| PipelineError::execution(format!("RDF parse error: {e}")))?;
        store
            .insert(&quad)
            .map_err(|e| PipelineError::execution(format!("failed to insert quad: {e}")))?;
        count += 1;
    }
    Ok(count)
}

#[async_trait]
impl QueryEngine for OxigraphEngine {
    fn name(&self) -> &'static str {
        "oxigraph"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Primary
    }

    async fn health_check(&self) -> Result<bool> {
        let prepared = SparqlEvaluator::new()
            .parse_query("ASK { ?s ?p ?o }")
            .map_err(|e| PipelineError::execution(format!("health check parse failed: {e}")))?;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            prepared
                .on_store(&store)
                .execute()
                .map(|result| matches!(result, QueryResults::Boolean(_)))
                .map_err(|e| PipelineError::execution(format!("health check failed: {e}")))
        })
        .await
        .map_err(|e| PipelineError::execution(format!("task join error: {e}")))?
    }

    async fn execute(&self, query: &str) -> Result<EngineOutput> {
        let prepared = SparqlEvaluator::new()
            .parse_query(query)
            .map_err(|e| PipelineError::execution(format!("failed to parse query: {e}")))?;

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let results = prepared
                .on_store(&store)
                .execute()
                .map_err(PipelineError::execution)?;
            match results {
                QueryResults::Solutions(solutions) => {
                    let mut out = Vec::new();
                    for solution in solutions {
                        let solution = solution.map_err(PipelineError::execution)?;
                        let mut entries = Vec::with_capacity(solution.len());
                        for (variable, term) in solution.iter() {
                            entries.push((variable.as_str().to_owned(), convert_term(term)?));
                        }
                        out.push(Solution::new(entries));
                    }
                    Ok(EngineOutput::Solutions(out))
                }
                QueryResults::Boolean(value) => Ok(EngineOutput::Solutions(vec![Solution::new(
                    vec![(
                        "result".to_owned(),
                        Term::typed_literal(
                            value.to_string(),
                            "http://www.w3.org/2001/XMLSchema#boolean",
                        ),
                    )],
                )])),
                QueryResults::Graph(_) => Err(PipelineError::execution(
                    "graph results are not supported by the row pipeline",
                )),
            }
        })
        .await
        .map_err(|e| PipelineError::execution(format!("task join error: {e}")))?
    }
}

fn convert_term(term: &OxTerm) -> Result<Term> {
    #[allow(unreachable_patterns)]
    match term {
        OxTerm::NamedNode(node) => Ok(Term::named(node.as_str())),
        OxTerm::BlankNode(node) => Ok(Term::blank(node.as_str())),
        OxTerm::Literal(literal) => {
            let datatype = literal.datatype().as_str();
            Ok(match literal.language() {
                Some(language) => Term::lang_literal(literal.value(), language),
                None if datatype == XSD_STRING || datatype == RDF_LANG_STRING => {
                    Term::literal(literal.value())
                }
                None => Term::typed_literal(literal.value(), datatype),
            })
        }
        other => Err(PipelineError::unsupported_term(format!("{other}"))),
    }
}
