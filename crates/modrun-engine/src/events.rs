use async_trait::async_trait;
use modrun_domain::AssetId;

use crate::error::EngineError;

/// Narrow event seam between the execution engine and the task orchestrator.
///
/// The engine announces each output asset that became `AVAILABLE` after a
/// task's terminal transition; the orchestrator reacts by promoting blocked
/// tasks. Holding the trait instead of a back-pointer keeps the dependency
/// one-directional.
#[async_trait]
pub trait AssetEvents: Send + Sync + 'static {
    async fn on_asset_available(&self, asset: &AssetId) -> Result<(), EngineError>;
}
