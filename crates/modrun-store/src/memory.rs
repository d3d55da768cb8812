use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use modrun_domain::{AssetId, ModuleId, TaskId, TaskStatus};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::records::{AssetRecord, ModuleRecord, TaskRecord};
use crate::store::DocumentStore;

#[derive(Debug, Default)]
struct Inner {
    modules: HashMap<ModuleId, ModuleRecord>,
    assets: HashMap<AssetId, AssetRecord>,
    tasks: HashMap<TaskId, TaskRecord>,
}

/// In-memory implementation of [`DocumentStore`].
///
/// All data is lost on process exit. Suitable for tests and scratch runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_module(&self, id: &ModuleId) -> Result<Option<ModuleRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.modules.get(id).cloned())
    }

    async fn list_modules(&self) -> Result<Vec<ModuleRecord>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<ModuleRecord> = guard.modules.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn upsert_module(&self, record: &ModuleRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.modules.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn append_install_log(&self, id: &ModuleId, line: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let record = guard.modules.get_mut(id).ok_or_else(|| StoreError::NotFound {
            collection: "module_registry",
            id: id.to_string(),
        })?;
        record.installation_logs.push(line.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_asset(&self, record: &AssetRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.assets.contains_key(&record.id) {
            return Err(StoreError::DuplicateId {
                collection: "assets",
                id: record.id.to_string(),
            });
        }
        guard.assets.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_asset(&self, id: &AssetId) -> Result<Option<AssetRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.assets.get(id).cloned())
    }

    async fn list_assets(&self) -> Result<Vec<AssetRecord>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<AssetRecord> = guard.assets.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn update_asset(&self, record: &AssetRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.assets.contains_key(&record.id) {
            return Err(StoreError::NotFound {
                collection: "assets",
                id: record.id.to_string(),
            });
        }
        guard.assets.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn insert_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.tasks.contains_key(&record.id) {
            return Err(StoreError::DuplicateId {
                collection: "tasks",
                id: record.id.to_string(),
            });
        }
        guard.tasks.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<TaskRecord> = guard.tasks.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn update_task(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.tasks.contains_key(&record.id) {
            return Err(StoreError::NotFound {
                collection: "tasks",
                id: record.id.to_string(),
            });
        }
        guard.tasks.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_blocked_by_asset(&self, asset: &AssetId) -> Result<Vec<TaskRecord>, StoreError> {
        let guard = self.inner.read().await;
        let mut hits: Vec<TaskRecord> = guard
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Blocked && t.blocking_assets.contains(asset))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(hits)
    }

    async fn claim_next_queued(&self) -> Result<Option<TaskRecord>, StoreError> {
        // Select-and-update under one write lock: at most one claimant wins.
        let mut guard = self.inner.write().await;
        let next_id = guard
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|t| t.id.clone());

        let Some(id) = next_id else {
            return Ok(None);
        };
        let task = guard.tasks.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            collection: "tasks",
            id: id.to_string(),
        })?;
        task.mark_running(Utc::now());
        Ok(Some(task.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn dummy_task(id: &str, blocking: Vec<AssetId>, created_offset_secs: i64) -> TaskRecord {
        let mut t = TaskRecord::new(
            TaskId::new(id),
            ModuleId::new("echo"),
            BTreeMap::new(),
            BTreeMap::new(),
            json!({}),
            blocking,
            Utc::now(),
        );
        t.created_at = t.created_at + Duration::seconds(created_offset_secs);
        t
    }

    fn dummy_asset(id: &str) -> AssetRecord {
        AssetRecord::value(
            AssetId::new(id),
            "v".to_string(),
            json!("x"),
            "text/plain".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_asset_ids() {
        let store = InMemoryStore::new();
        store.insert_asset(&dummy_asset("a")).await.unwrap();
        let err = store.insert_asset(&dummy_asset("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn claim_is_fifo_by_created_at() {
        let store = InMemoryStore::new();
        store.insert_task(&dummy_task("late", vec![], 10)).await.unwrap();
        store.insert_task(&dummy_task("early", vec![], 0)).await.unwrap();

        let first = store.claim_next_queued().await.unwrap().unwrap();
        assert_eq!(first.id.as_str(), "early");
        assert_eq!(first.status, TaskStatus::Running);
        assert!(first.started_at.is_some());

        let second = store.claim_next_queued().await.unwrap().unwrap();
        assert_eq!(second.id.as_str(), "late");

        assert!(store.claim_next_queued().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_skips_blocked_tasks() {
        let store = InMemoryStore::new();
        store
            .insert_task(&dummy_task("blocked", vec![AssetId::new("a")], 0))
            .await
            .unwrap();
        assert!(store.claim_next_queued().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_never_hand_out_the_same_task() {
        let store = InMemoryStore::new();
        store.insert_task(&dummy_task("only", vec![], 0)).await.unwrap();

        let mut claims = Vec::new();
        for _ in 0..8 {
            let s = store.clone();
            claims.push(tokio::spawn(async move { s.claim_next_queued().await.unwrap() }));
        }
        let mut won = 0;
        for c in claims {
            if c.await.unwrap().is_some() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn find_blocked_by_asset_matches_blockers_only() {
        let store = InMemoryStore::new();
        let a = AssetId::new("a");
        store.insert_task(&dummy_task("t1", vec![a.clone()], 0)).await.unwrap();
        store.insert_task(&dummy_task("t2", vec![AssetId::new("b")], 1)).await.unwrap();
        store.insert_task(&dummy_task("t3", vec![], 2)).await.unwrap();

        let hits = store.find_blocked_by_asset(&a).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "t1");
    }

    #[tokio::test]
    async fn update_unknown_task_is_an_error() {
        let store = InMemoryStore::new();
        let t = dummy_task("ghost", vec![], 0);
        assert!(matches!(
            store.update_task(&t).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
