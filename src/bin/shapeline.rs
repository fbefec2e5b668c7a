//! Binary entry point for the shapeline server and tools.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use shapeline::{
    config::ShapelineConfig,
    engine::{EngineAdapter, EngineConfig, EngineSelection, StoreConfig},
    logging::install_tracing_subscriber,
    server, OperationRegistry,
};

#[derive(Parser, Debug)]
#[command(
    name = "shapeline",
    version,
    about = "Shape-checked query pipeline over RDF data",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SHAPELINE_LOG",
        help = "Log filter directive; overrides the config file"
    )]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConfigArg {
    #[arg(
        long,
        value_name = "FILE",
        env = "SHAPELINE_CONFIG",
        help = "Config file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve declared operations over HTTP.
    Serve {
        #[command(flatten)]
        config: ConfigArg,

        #[arg(long, help = "Interface to bind")]
        host: Option<IpAddr>,

        #[arg(long, help = "Port to listen on")]
        port: Option<u16>,
    },
    /// Run a raw SPARQL query against data files and print the rows as JSON.
    Query {
        #[arg(long = "data", value_name = "FILE", required = true)]
        data: Vec<PathBuf>,

        #[arg(long, help = "Base IRI for relative IRIs in the data")]
        base_iri: Option<String>,

        #[arg(value_name = "SPARQL")]
        query: String,
    },
    /// Validate a config file and print each operation's query text.
    Check {
        #[command(flatten)]
        config: ConfigArg,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => {
            let mut config = ShapelineConfig::load_or_default(config.config)?;
            install_tracing_subscriber(cli.log_level.as_deref().unwrap_or(&config.log_level));
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let handler = Arc::new(config.build_handler(OperationRegistry::new()));
            server::serve(&config.server, handler).await?;
        }
        Command::Query {
            data,
            base_iri,
            query,
        } => {
            install_tracing_subscriber(cli.log_level.as_deref().unwrap_or("warn"));
            let adapter = EngineAdapter::new(EngineConfig {
                backend: EngineSelection::Primary,
                store: StoreConfig { data, base_iri },
            });
            let rows = adapter.execute(&query, None).await?.collect_rows()?;
            let rendered: Vec<Value> = rows
                .iter()
                .map(|row| {
                    let mut object = Map::new();
                    for (name, term) in row.iter() {
                        object.insert(name.to_owned(), serde_json::to_value(term)?);
                    }
                    Ok(Value::Object(object))
                })
                .collect::<Result<_, serde_json::Error>>()?;
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Command::Check { config } => {
            let config = ShapelineConfig::load_or_default(config.config)?;
            install_tracing_subscriber(cli.log_level.as_deref().unwrap_or(&config.log_level));
            println!(
                "config ok: {} operation(s), {} shape(s), backend {:?}",
                config.operations.len(),
                config.shapes.len(),
                config.engine.backend
            );
            for op in &config.operations {
                let text = op.build_query(&Map::new())?.to_query_text()?;
                println!("\n# {}\n{}", op.name, text);
            }
        }
    }
    Ok(())
}
