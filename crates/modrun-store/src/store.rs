use async_trait::async_trait;
use modrun_domain::{AssetId, ModuleId, TaskId};

use crate::error::StoreError;
use crate::records::{AssetRecord, ModuleRecord, TaskRecord};

/// Thin typed access to the three collections: `module_registry`, `assets`,
/// `tasks`. Ids are unique per collection; `insert_*` rejects duplicates and
/// `update_*` rejects unknown ids.
///
/// The store is the only channel of cross-worker communication: every
/// algorithm in the system is reconstructible from its contents.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    // ── module_registry ───────────────────────────────────────────────────────

    async fn get_module(&self, id: &ModuleId) -> Result<Option<ModuleRecord>, StoreError>;
    async fn list_modules(&self) -> Result<Vec<ModuleRecord>, StoreError>;
    async fn upsert_module(&self, record: &ModuleRecord) -> Result<(), StoreError>;

    /// Append one line to a module's `installation_logs`.
    async fn append_install_log(&self, id: &ModuleId, line: &str) -> Result<(), StoreError>;

    // ── assets ────────────────────────────────────────────────────────────────

    async fn insert_asset(&self, record: &AssetRecord) -> Result<(), StoreError>;
    async fn get_asset(&self, id: &AssetId) -> Result<Option<AssetRecord>, StoreError>;
    async fn list_assets(&self) -> Result<Vec<AssetRecord>, StoreError>;
    async fn update_asset(&self, record: &AssetRecord) -> Result<(), StoreError>;

    // ── tasks ─────────────────────────────────────────────────────────────────

    async fn insert_task(&self, record: &TaskRecord) -> Result<(), StoreError>;
    async fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;
    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// All `BLOCKED` tasks whose `blocking_assets` contains `asset`.
    async fn find_blocked_by_asset(&self, asset: &AssetId) -> Result<Vec<TaskRecord>, StoreError>;

    /// Atomically claim the oldest `QUEUED` task (FIFO by `created_at`):
    /// transition it to `RUNNING`, stamp `started_at`, and return the claimed
    /// record. The select-and-update is a single store operation so that a
    /// task is claimed by at most one worker.
    async fn claim_next_queued(&self) -> Result<Option<TaskRecord>, StoreError>;
}
