use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use modrun_domain::{AssetId, ModuleId, TaskId, TaskStatus};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::records::{AssetRecord, ModuleRecord, TaskRecord};
use crate::store::DocumentStore;

const MODULES: TableDefinition<&str, &[u8]> = TableDefinition::new("module_registry");
const ASSETS: TableDefinition<&str, &[u8]> = TableDefinition::new("assets");
const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Persistent document store backed by a redb database file.
///
/// All registry, asset, and task state survives process restarts; pre-existing
/// `RUNNING` records are left untouched on reopen.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a redb database at `path`.
    ///
    /// Parent directories are created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;

        // Ensure tables exist
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(MODULES).map_err(internal)?;
            wtxn.open_table(ASSETS).map_err(internal)?;
            wtxn.open_table(TASKS).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    fn read_one<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(table).map_err(internal)?;
        match table.get(key).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn read_all<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<T>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(table).map_err(internal)?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            results.push(serde_json::from_slice(v.value())?);
        }
        Ok(results)
    }

    fn write_one<T: serde::Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(table).map_err(internal)?;
            table.insert(key, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn insert_unique<T: serde::Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        collection: &'static str,
        key: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(table).map_err(internal)?;
            if table.get(key).map_err(internal)?.is_some() {
                return Err(StoreError::DuplicateId { collection, id: key.to_string() });
            }
            table.insert(key, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    fn update_existing<T: serde::Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        collection: &'static str,
        key: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(table).map_err(internal)?;
            if table.get(key).map_err(internal)?.is_none() {
                return Err(StoreError::NotFound { collection, id: key.to_string() });
            }
            table.insert(key, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}

fn internal(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(e.to_string())
}

#[async_trait]
impl DocumentStore for RedbStore {
    async fn get_module(&self, id: &ModuleId) -> Result<Option<ModuleRecord>, StoreError> {
        self.read_one(MODULES, id.as_str())
    }

    async fn list_modules(&self) -> Result<Vec<ModuleRecord>, StoreError> {
        let mut all: Vec<ModuleRecord> = self.read_all(MODULES)?;
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn upsert_module(&self, record: &ModuleRecord) -> Result<(), StoreError> {
        self.write_one(MODULES, record.id.as_str(), record)
    }

    async fn append_install_log(&self, id: &ModuleId, line: &str) -> Result<(), StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(MODULES).map_err(internal)?;
            let mut record: ModuleRecord = match table.get(id.as_str()).map_err(internal)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => {
                    return Err(StoreError::NotFound {
                        collection: "module_registry",
                        id: id.to_string(),
                    })
                }
            };
            record.installation_logs.push(line.to_string());
            record.updated_at = Utc::now();
            let bytes = serde_json::to_vec(&record)?;
            table.insert(id.as_str(), bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn insert_asset(&self, record: &AssetRecord) -> Result<(), StoreError> {
        self.insert_unique(ASSETS, "assets", record.id.as_str(), record)
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Option<AssetRecord>, StoreError> {
        self.read_one(ASSETS, id.as_str())
    }

    async fn list_assets(&self) -> Result<Vec<AssetRecord>, StoreError> {
        let mut all: Vec<AssetRecord> = self.read_all(ASSETS)?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn update_asset(&self, record: &AssetRecord) -> Result<(), StoreError> {
        self.update_existing(ASSETS, "assets", record.id.as_str(), record)
    }

    async fn insert_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.insert_unique(TASKS, "tasks", record.id.as_str(), record)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.read_one(TASKS, id.as_str())
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut all: Vec<TaskRecord> = self.read_all(TASKS)?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.update_existing(TASKS, "tasks", record.id.as_str(), record)
    }

    async fn find_blocked_by_asset(&self, asset: &AssetId) -> Result<Vec<TaskRecord>, StoreError> {
        let mut hits: Vec<TaskRecord> = self
            .read_all::<TaskRecord>(TASKS)?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Blocked && t.blocking_assets.contains(asset))
            .collect();
        hits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(hits)
    }

    async fn claim_next_queued(&self) -> Result<Option<TaskRecord>, StoreError> {
        // Select-and-update inside one write transaction: at most one
        // claimant wins even across processes sharing the database file.
        let wtxn = self.db.begin_write().map_err(internal)?;
        let claimed = {
            let mut table = wtxn.open_table(TASKS).map_err(internal)?;
            let mut oldest: Option<TaskRecord> = None;
            for entry in table.iter().map_err(internal)? {
                let (_k, v) = entry.map_err(internal)?;
                let task: TaskRecord = serde_json::from_slice(v.value())?;
                if task.status != TaskStatus::Queued {
                    continue;
                }
                let is_older = oldest.as_ref().map_or(true, |cur| {
                    (task.created_at, &task.id) < (cur.created_at, &cur.id)
                });
                if is_older {
                    oldest = Some(task);
                }
            }
            match oldest {
                Some(mut task) => {
                    task.mark_running(Utc::now());
                    let bytes = serde_json::to_vec(&task)?;
                    table
                        .insert(task.id.as_str(), bytes.as_slice())
                        .map_err(internal)?;
                    Some(task)
                }
                None => None,
            }
        };
        wtxn.commit().map_err(internal)?;
        Ok(claimed)
    }
}
