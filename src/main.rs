//! Idios CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use idios::domain::models::model_registry;
use idios::domain::ports::EmbeddingProvider;
use idios::infrastructure::amqp::worker::serve_health;
use idios::infrastructure::amqp::RpcWorker;
use idios::infrastructure::config::{Config, ConfigLoader};
use idios::infrastructure::embeddings::{RemoteGlobalProvider, RemoteLocalProvider};
use idios::infrastructure::http;
use idios::infrastructure::image::HttpImageFetcher;
use idios::infrastructure::logging;
use idios::infrastructure::milvus::{MilvusClient, MilvusCollection};
use idios::services::commands::{CommandService, ModelRuntime};

#[derive(Parser)]
#[command(name = "idios", about = "Reverse image search service", version)]
struct Cli {
    /// Path to the configuration file (default: idios.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stateless HTTP front-end
    Serve,
    /// Run a queue worker (creates collections at startup)
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")?;

    logging::init(&config.logging).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Serve => http::serve(&config).await,
        Commands::Worker => run_worker(config).await,
    }
}

/// Wires the worker: vector store connection, one collection and provider
/// per registered model, the command service, and the queue consumer with
/// its health endpoint.
async fn run_worker(config: Config) -> Result<()> {
    let milvus = Arc::new(
        MilvusClient::connect(&config.milvus)
            .await
            .context("Failed to connect to the vector store")?,
    );

    let mut runtimes = Vec::new();
    for descriptor in model_registry() {
        let collection = MilvusCollection::open_or_create(Arc::clone(&milvus), descriptor)
            .await
            .with_context(|| format!("Failed to open collection '{}'", descriptor.name))?;

        let provider: Arc<dyn EmbeddingProvider> = if descriptor.is_local_feature() {
            Arc::new(RemoteLocalProvider::new(descriptor, config.embeddings.clone())?)
        } else {
            Arc::new(RemoteGlobalProvider::new(descriptor, config.embeddings.clone())?)
        };

        runtimes.push(ModelRuntime {
            descriptor,
            provider,
            collection: Arc::new(collection),
        });
    }

    let fetcher = Arc::new(HttpImageFetcher::new()?);
    let service = Arc::new(CommandService::new(runtimes, fetcher));
    let worker = RpcWorker::new(config.amqp.clone(), service);

    let health = tokio::spawn(serve_health(
        config.worker.health_port,
        worker.health_flag(),
    ));
    let result = worker.run().await;
    health.abort();
    result
}
