use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use silt_config::ConfigLoader;
use silt_core::ProcessorKind;
use silt_embed::{CompositeEmbeddingProvider, LocalEmbeddingClient, RemoteEmbeddingClient};
use silt_pipeline::WorkerPool;
use silt_processors::{LocalLlmProcessor, RemoteLlmProcessor, VectorProcessor};
use silt_queue::ProcessingQueue;
use silt_templates::PromptTemplateManager;
use silt_vector::LanceVectorStore;
use silt_watch::Watcher;
use tokio::sync::RwLock;

#[derive(Parser)]
#[command(name = "silt", about = "Local-first ingestion pipeline: watch, queue, process, index")]
struct Cli {
    #[arg(long, default_value = "silt.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the watcher and worker pool and run until interrupted.
    Run,
    /// Enqueue one item per matching existing file, then exit.
    Scan,
    /// Print a snapshot of queue and worker status as JSON.
    Status,
    /// Print the JSON Schema for the monitor config file and exit.
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Command::Schema) {
        println!("{}", serde_json::to_string_pretty(&ConfigLoader::json_schema())?);
        return Ok(());
    }

    let monitor_config = ConfigLoader::load(&cli.config).await?;
    ConfigLoader::validate_or_err(&monitor_config)?;

    let queue = Arc::new(ProcessingQueue::new(monitor_config.queue_max_size));
    let config_handle = Arc::new(RwLock::new(monitor_config));

    match cli.command {
        Command::Scan => {
            let watcher = Watcher::new(Arc::clone(&config_handle), Arc::clone(&queue));
            let enqueued = watcher.process_existing_files(None).await?;
            println!("enqueued {enqueued} items from existing files");
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&queue.summary())?);
        }
        Command::Schema => unreachable!("handled before config load"),
        Command::Run => {
            let config = config_handle.read().await.clone();

            let embedder: Arc<dyn silt_core::EmbeddingProvider> = {
                let mut provider = CompositeEmbeddingProvider::new(true, "nomic-embed-text")
                    .with_local_client(LocalEmbeddingClient::default_local());
                if let Ok(api_key) = std::env::var("SILT_REMOTE_API_KEY") {
                    provider = provider
                        .with_remote(RemoteEmbeddingClient::new(api_key, "text-embedding-3-small"));
                }
                Arc::new(provider)
            };

            let data_dir = ConfigLoader::default_data_dir();
            let vector_db_path = data_dir.join("vector_db");
            let vector_store: Arc<dyn silt_core::VectorStore> = Arc::new(
                LanceVectorStore::connect(
                    &vector_db_path.to_string_lossy(),
                    "silt_documents",
                    Arc::clone(&embedder),
                )
                .await?,
            );

            let templates = PromptTemplateManager::load(data_dir.join("templates")).await?;

            let pool = Arc::new(
                WorkerPool::new(Arc::clone(&queue), config.max_concurrent)
                    .register_processor(
                        ProcessorKind::LocalLlm,
                        Arc::new(
                            LocalLlmProcessor::new("http://localhost:11434", "llama3")
                                .with_templates(Arc::clone(&templates)),
                        ),
                    )
                    .register_processor(
                        ProcessorKind::Vector,
                        Arc::new(VectorProcessor::new(Arc::clone(&vector_store))),
                    )
                    .with_vector_sink(Arc::new(VectorProcessor::new(Arc::clone(&vector_store)))),
            );

            let pool_with_remote = if let Ok(api_key) = std::env::var("SILT_REMOTE_LLM_API_KEY") {
                let remote = RemoteLlmProcessor::new(api_key, "gpt-4o-mini");
                Arc::new(
                    Arc::try_unwrap(pool)
                        .unwrap_or_else(|_| unreachable!("pool has a single owner here"))
                        .register_processor(ProcessorKind::RemoteLlm, Arc::new(remote)),
                )
            } else {
                pool
            };

            let mut watcher = Watcher::new(Arc::clone(&config_handle), Arc::clone(&queue));
            let watch_handle = watcher.start().await?;
            let worker_handles = pool_with_remote.start();

            tracing::info!(workers = config.max_concurrent, "pipeline running");
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown requested");
            pool_with_remote.stop();
            watch_handle.abort();
            for handle in worker_handles {
                let _ = handle.await;
            }
        }
    }

    Ok(())
}
