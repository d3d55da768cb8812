use std::sync::Arc;

use modrun_assets::AssetManager;
use modrun_engine::TaskOrchestrator;
use modrun_registry::RegistryOrchestrator;
use modrun_store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub assets: Arc<AssetManager>,
    pub tasks: Arc<TaskOrchestrator>,
    pub registry: Arc<RegistryOrchestrator>,
}
