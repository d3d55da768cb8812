use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use modrun_api::{build_app, AppState};
use modrun_assets::AssetManager;
use modrun_config::{ServiceConfig, StoreBackend};
use modrun_domain::{ModuleId, TaskId};
use modrun_engine::{run_worker, ExecutionEngine, TaskOrchestrator};
use modrun_registry::RegistryOrchestrator;
use modrun_store::{DocumentStore, InMemoryStore, RedbStore};
use serde_json::Value;
use tracing::{debug, info};

use crate::output;

/// The composition root: one store, one instance of each component, shared
/// by `Arc`. No global state.
struct Services {
    config: ServiceConfig,
    store: Arc<dyn DocumentStore>,
    assets: Arc<AssetManager>,
    tasks: Arc<TaskOrchestrator>,
    registry: Arc<RegistryOrchestrator>,
    engine: Arc<ExecutionEngine>,
}

fn build(config: ServiceConfig) -> Result<Services> {
    let store: Arc<dyn DocumentStore> = match &config.store {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::Redb { path } => Arc::new(
            RedbStore::open(path).with_context(|| format!("open store at {}", path.display()))?,
        ),
    };

    let assets = Arc::new(
        AssetManager::new(store.clone(), &config.storage_root)
            .with_context(|| format!("prepare storage at {}", config.storage_root.display()))?,
    );
    let tasks = Arc::new(TaskOrchestrator::new(store.clone(), assets.clone()));
    let registry = Arc::new(RegistryOrchestrator::new(
        config.modules_root.clone(),
        store.clone(),
        &config.base_interpreter,
    ));
    let engine = Arc::new(ExecutionEngine::new(
        store.clone(),
        assets.clone(),
        tasks.clone(),
        config.default_timeout_secs,
    ));

    Ok(Services { config, store, assets, tasks, registry, engine })
}

pub async fn serve(config: ServiceConfig) -> Result<()> {
    let services = build(config)?;

    info!("running startup module scan");
    services.registry.discover_and_register().await?;

    let poll = Duration::from_millis(services.config.poll_interval_ms);
    for worker in 0..services.config.workers {
        tokio::spawn(run_worker(services.engine.clone(), poll));
        debug!(worker, "spawned execution worker");
    }

    let app = build_app(AppState {
        store: services.store.clone(),
        assets: services.assets.clone(),
        tasks: services.tasks.clone(),
        registry: services.registry.clone(),
    });

    let addr = format!("{}:{}", services.config.bind, services.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(%addr, "modrun API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn scan(config: ServiceConfig) -> Result<()> {
    let services = build(config)?;
    services.registry.discover_and_register().await?;
    let modules = services.store.list_modules().await?;
    print!("{}", output::render_modules(&modules));
    Ok(())
}

pub async fn modules(config: ServiceConfig) -> Result<()> {
    let services = build(config)?;
    let modules = services.store.list_modules().await?;
    print!("{}", output::render_modules(&modules));
    Ok(())
}

pub async fn assets(config: ServiceConfig) -> Result<()> {
    let services = build(config)?;
    let assets = services.store.list_assets().await?;
    print!("{}", output::render_assets(&assets));
    Ok(())
}

pub async fn ingest(
    config: ServiceConfig,
    path: PathBuf,
    label: Option<String>,
    media_type: String,
) -> Result<()> {
    let services = build(config)?;
    let label = label.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string())
    });
    let record = services.assets.ingest(&path, &label, &media_type).await?;
    println!("{}", record.id);
    Ok(())
}

pub async fn value(
    config: ServiceConfig,
    label: String,
    value: String,
    media_type: String,
) -> Result<()> {
    let services = build(config)?;
    let content =
        serde_json::from_str::<Value>(&value).unwrap_or_else(|_| Value::String(value));
    let record = services.assets.create_value(&label, content, &media_type).await?;
    println!("{}", record.id);
    Ok(())
}

pub async fn submit(
    config: ServiceConfig,
    module_id: String,
    inputs: Vec<(String, String)>,
    task_config: Option<String>,
) -> Result<()> {
    let services = build(config)?;
    let input_map = inputs.into_iter().collect();
    let task_config = task_config
        .map(|raw| serde_json::from_str::<Value>(&raw).context("parse --config as JSON"))
        .transpose()?;

    let receipt = services
        .tasks
        .submit(&ModuleId::new(module_id), &input_map, task_config)
        .await?;

    println!("task:   {}", receipt.task_id);
    println!("status: {}", receipt.status);
    for (key, asset_id) in &receipt.outputs {
        println!("output: {} -> {}", key, asset_id);
    }
    Ok(())
}

pub async fn task(config: ServiceConfig, id: String) -> Result<()> {
    let services = build(config)?;
    let record = services
        .store
        .get_task(&TaskId::new(&id))
        .await?
        .with_context(|| format!("task '{}' not found", id))?;
    print!("{}", output::render_task(&record));
    Ok(())
}
