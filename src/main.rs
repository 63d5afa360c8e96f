use anyhow::Context;
use clap::{Parser, Subcommand};
use datagate::backend::{Behavior, MockEmbeddingProvider, ScriptedBackend, Statement};
use datagate::context::CommandContext;
use datagate::pipeline::{
    InsertPipeline, ReadPipeline, ReadStatement, SchemaChange, SchemaPipeline, run_in_context,
};
use datagate::{EngineConfig, TaskFault};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TABLE: &str = "items";
const EMBEDDING_DIMENSION: usize = 8;

#[derive(Debug, Parser)]
#[command(name = "datagate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs gateway commands through the task engine against scripted backends")]
#[command(arg_required_else_help = true)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Tenant the command is served for
    #[arg(short = 't', long = "tenant", global = true)]
    tenant: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Insert generated documents
    Insert {
        /// Number of documents
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        /// Insert one at a time and stop at the first failure
        #[arg(long)]
        ordered: bool,
        /// Give every document a text to vectorize
        #[arg(long)]
        vectorize: bool,
        /// Make the insert of this document fail
        #[arg(long = "fail-at")]
        fail_at: Option<usize>,
        /// Report a per-document outcome
        #[arg(long = "document-responses")]
        document_responses: bool,
    },
    /// Read a table split into partitions
    Read {
        #[arg(short = 'p', long, default_value_t = 4)]
        partitions: usize,
    },
    /// Create a table and its indexes
    Schema {
        #[arg(short = 'i', long, default_value_t = 2)]
        indexes: usize,
        /// Make the creation of this index fail
        #[arg(long = "fail-at")]
        fail_at: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("datagate=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Arc::new(
        EngineConfig::load(args.config.as_deref()).context("failed to load configuration")?,
    );
    info!(keyspace = %config.keyspace, "Configuration loaded");

    let (command, operation) = match args.command {
        Commands::Insert {
            count,
            ordered,
            vectorize,
            fail_at,
            document_responses,
        } => {
            let mut backend = ScriptedBackend::new();
            if let Some(index) = fail_at {
                backend = backend.on(
                    format!("\"doc-{index}\""),
                    Behavior::Fail(TaskFault::InvalidQuery(format!(
                        "document doc-{index} rejected by the backend"
                    ))),
                );
            }

            let documents: Vec<Value> = (0..count)
                .map(|i| {
                    let mut document = json!({ "_id": format!("doc-{i}"), "name": format!("item {i}") });
                    if vectorize {
                        document["$vectorize"] = json!(format!("description of item {i}"));
                    }
                    document
                })
                .collect();

            let operation = InsertPipeline::new(TABLE, Arc::new(backend))
                .ordered(ordered)
                .document_responses(document_responses)
                .embedding_provider(Arc::new(MockEmbeddingProvider::new(EMBEDDING_DIMENSION)))
                .build(documents, &config);
            ("insertMany", operation)
        }
        Commands::Read { partitions } => {
            let mut backend = ScriptedBackend::new();
            let mut statements = Vec::with_capacity(partitions);
            for i in 0..partitions {
                let marker = format!("partition-{i}");
                backend = backend.on(
                    format!("\"{marker}\""),
                    Behavior::Delayed(
                        Duration::from_millis(((partitions - i) * 10) as u64),
                        Box::new(Behavior::Rows(vec![json!({ "_id": format!("{marker}-row") })])),
                    ),
                );
                statements.push(ReadStatement::new(
                    Statement::new(format!(
                        "SELECT key, doc_json FROM {}.{TABLE} WHERE partition = ?",
                        config.keyspace
                    ))
                    .with_values(vec![json!(marker)]),
                ));
            }

            let operation = ReadPipeline::new(TABLE, Arc::new(backend))
                .projection_schema(json!({ "_id": "text", "doc_json": "text" }))
                .build(statements, &config);
            ("find", operation)
        }
        Commands::Schema { indexes, fail_at } => {
            let mut backend = ScriptedBackend::new();
            if let Some(index) = fail_at {
                backend = backend.on(
                    format!("idx_{index} "),
                    Behavior::Fail(TaskFault::InvalidQuery(format!(
                        "index idx_{index} cannot be created"
                    ))),
                );
            }

            let mut changes = vec![SchemaChange::ddl(
                Statement::new(format!(
                    "CREATE TABLE IF NOT EXISTS {}.{TABLE} (key text PRIMARY KEY, doc_json text)",
                    config.keyspace
                )),
                true,
            )];
            changes.extend((0..indexes).map(|i| {
                SchemaChange::ddl(
                    Statement::new(format!(
                        "CREATE CUSTOM INDEX IF NOT EXISTS idx_{i} ON {}.{TABLE} (col_{i})",
                        config.keyspace
                    )),
                    true,
                )
            }));

            let operation = SchemaPipeline::new(Arc::new(backend)).build(changes, &config);
            ("createCollection", operation)
        }
    };

    let mut ctx = CommandContext::new(command, Arc::clone(&config));
    if let Some(tenant) = args.tenant {
        ctx = ctx.with_tenant(tenant);
    }
    let result = run_in_context(operation, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
