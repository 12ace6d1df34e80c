use clap::{Parser, ValueEnum};
use sorterra_lib::agent::{BatchRequest, BatchRunner, Orchestrator};
use sorterra_lib::ai::AnthropicReasoner;
use sorterra_lib::analyzer::RecursiveAnalyzer;
use sorterra_lib::execution::ActionExecutor;
use sorterra_lib::storage::{DocumentLibraryBackend, LocalBackend, ObjectStoreBackend, StorageBackend};
use sorterra_lib::vector::{Embedder, FastEmbedder, HashingEmbedder, InMemoryRecordStore, RecordStore, SimilarityMemory, SqliteRecordStore};
use sorterra_lib::SorterraConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendKind {
    Local,
    S3,
    Sharepoint,
}

/// Sort documents into a folder hierarchy using rules and past decisions
#[derive(Debug, Parser)]
#[command(name = "sorterra", version)]
struct Cli {
    /// File or folder to sort (relative to the backend root)
    target: String,

    #[arg(long, env = "SORTERRA_BACKEND", value_enum, default_value_t = BackendKind::Local)]
    backend: BackendKind,

    /// Root directory for the local backend
    #[arg(long, env = "SORTERRA_LOCAL_ROOT", default_value = ".")]
    root: PathBuf,

    /// Rule set JSON file (overrides SORTERRA_RULES_FILE)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Seconds to wait between files (overrides SORTERRA_INTER_FILE_DELAY_SECS)
    #[arg(long)]
    delay_secs: Option<u64>,

    /// Keep the similarity memory in this process only
    #[arg(long)]
    ephemeral_memory: bool,

    /// Use the hashing embedder instead of downloading the embedding model
    #[arg(long)]
    offline_embeddings: bool,

    /// Print the batch response as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // `.env` must be loaded before clap reads its `env` fallbacks
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("[Main] {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = SorterraConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(rules) = cli.rules {
        config.rules_file = Some(rules);
    }
    if let Some(secs) = cli.delay_secs {
        config.batch.inter_file_delay = Duration::from_secs(secs);
    }
    let rule_set = config.rule_set().map_err(|e| e.to_string())?;

    let api_key = config.anthropic_api_key.clone().unwrap_or_default();
    let planner = Arc::new(AnthropicReasoner::new(&api_key, &config.model).map_err(|e| e.to_string())?);
    let sub_reasoner =
        Arc::new(AnthropicReasoner::new(&api_key, &config.subquery_model).map_err(|e| e.to_string())?);

    let (backend, destination_root) = build_backend(cli.backend, &cli.root, &config).await?;
    let memory = Arc::new(build_memory(&config, cli.ephemeral_memory, cli.offline_embeddings).await?);
    tracing::info!("[Main] {} backend, {} memory record(s)", backend.name(), memory.len());

    let analyzer = RecursiveAnalyzer::new(sub_reasoner.clone(), sub_reasoner, config.analyzer.clone());
    let mut executor = ActionExecutor::new(backend, memory.clone());
    if let Some(root) = destination_root {
        executor = executor.with_destination_root(root);
    }
    let orchestrator = Orchestrator::with_config(planner, analyzer, executor, memory, config.agent.clone());
    let runner = BatchRunner::new(orchestrator, rule_set, config.batch.clone());

    let response = runner
        .run(BatchRequest {
            target: cli.target,
            rule_set: None,
        })
        .await;

    if cli.json {
        let json = serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else {
        println!("{}", response.result);
    }
    Ok(())
}

/// The backend plus the destination root its sorted folders live under,
/// when it differs from the executor's default
async fn build_backend(
    kind: BackendKind,
    root: &Path,
    config: &SorterraConfig,
) -> Result<(Arc<dyn StorageBackend>, Option<String>), String> {
    match kind {
        BackendKind::Local => {
            if !root.is_dir() {
                return Err(format!("Root is not a directory: {}", root.display()));
            }
            Ok((Arc::new(LocalBackend::new(root)), None))
        }
        BackendKind::S3 => {
            let bucket = config
                .bucket
                .clone()
                .ok_or("SORTERRA_BUCKET is required for the s3 backend")?;
            let backend = ObjectStoreBackend::from_env(bucket).await;
            tracing::info!("[Main] Sorting in s3://{}", backend.bucket());
            Ok((Arc::new(backend), None))
        }
        BackendKind::Sharepoint => {
            let site = config
                .sharepoint_site_url
                .clone()
                .ok_or("SHAREPOINT_SITE_URL is required for the sharepoint backend")?;
            let token = config
                .sharepoint_access_token
                .clone()
                .ok_or("SHAREPOINT_ACCESS_TOKEN is required for the sharepoint backend")?;
            let mut backend = DocumentLibraryBackend::new(site, token);
            if let Some(library) = &config.sharepoint_library {
                backend = backend.with_library(library);
            }
            let library = backend.library().to_string();
            tracing::info!("[Main] Sorting in SharePoint library {}", library);
            Ok((Arc::new(backend), Some(library)))
        }
    }
}

async fn build_memory(
    config: &SorterraConfig,
    ephemeral: bool,
    offline: bool,
) -> Result<SimilarityMemory, String> {
    let embedder: Arc<dyn Embedder> = if offline {
        Arc::new(HashingEmbedder::default())
    } else {
        match tokio::task::spawn_blocking(FastEmbedder::new).await {
            Ok(Ok(embedder)) => Arc::new(embedder),
            Ok(Err(e)) => {
                tracing::warn!("[Main] Embedding model unavailable ({}), using hashing embedder", e);
                Arc::new(HashingEmbedder::default())
            }
            Err(e) => return Err(format!("Embedder task failed: {}", e)),
        }
    };

    let store: Arc<dyn RecordStore> = if ephemeral {
        Arc::new(InMemoryRecordStore::new())
    } else {
        let dir = config.memory_dir.clone();
        let store = tokio::task::spawn_blocking(move || SqliteRecordStore::open(&dir))
            .await
            .map_err(|e| format!("Memory task failed: {}", e))?
            .map_err(|e| format!("Failed to open memory at {}: {}", config.memory_dir.display(), e))?;
        tracing::info!("[Main] Memory at {}", store.db_path().display());
        Arc::new(store)
    };

    Ok(SimilarityMemory::new(embedder, store, config.memory.clone()))
}
