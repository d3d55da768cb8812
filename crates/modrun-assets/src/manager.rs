use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use modrun_domain::{AssetId, AssetKind, AssetStatus, OutputPayload, TaskId};
use modrun_store::{AssetRecord, DocumentStore};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AssetError;

/// Owns the asset lifecycle and the on-disk storage layout:
///
/// ```text
/// <storage_root>/
///   uploads/YYYY-MM-DD/<asset_id>_<original_name>   ingested files
///   generated/<task_id>/<output_name>               task outputs
/// ```
pub struct AssetManager {
    store: Arc<dyn DocumentStore>,
    uploads_dir: PathBuf,
    generated_dir: PathBuf,
}

impl AssetManager {
    pub fn new(store: Arc<dyn DocumentStore>, storage_root: &Path) -> Result<Self, AssetError> {
        let uploads_dir = storage_root.join("uploads");
        let generated_dir = storage_root.join("generated");
        std::fs::create_dir_all(&uploads_dir)?;
        std::fs::create_dir_all(&generated_dir)?;
        Ok(Self { store, uploads_dir, generated_dir })
    }

    /// Copy an existing file into today's uploads subtree and register it as
    /// an `AVAILABLE` `FILE` asset. Fails if the source is absent; no record
    /// is created in that case.
    pub async fn ingest(
        &self,
        source: &Path,
        label: &str,
        media_type: &str,
    ) -> Result<AssetRecord, AssetError> {
        if !source.exists() {
            return Err(AssetError::SourceMissing(source.display().to_string()));
        }

        let id = AssetId::new(Uuid::new_v4().to_string());
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        let dest_dir = self.uploads_dir.join(Utc::now().format("%Y-%m-%d").to_string());
        tokio::fs::create_dir_all(&dest_dir).await?;
        let dest = dest_dir.join(format!("{}_{}", id, name));
        tokio::fs::copy(source, &dest).await?;

        let record = AssetRecord::ingested(
            id,
            label.to_string(),
            media_type.to_string(),
            dest,
            Utc::now(),
        );
        self.store.insert_asset(&record).await?;
        info!(asset_id = %record.id, label, "ingested file asset");
        Ok(record)
    }

    /// Create a `PENDING` promise owned by `task`. No storage path yet.
    pub async fn create_pending(
        &self,
        task: &TaskId,
        label: &str,
        media_type: &str,
    ) -> Result<AssetRecord, AssetError> {
        let record = AssetRecord::pending(
            AssetId::new(Uuid::new_v4().to_string()),
            task.clone(),
            label.to_string(),
            media_type.to_string(),
            Utc::now(),
        );
        self.store.insert_asset(&record).await?;
        Ok(record)
    }

    /// Create an `AVAILABLE` `VALUE` asset with inline content.
    pub async fn create_value(
        &self,
        label: &str,
        value: Value,
        media_type: &str,
    ) -> Result<AssetRecord, AssetError> {
        let record = AssetRecord::value(
            AssetId::new(Uuid::new_v4().to_string()),
            label.to_string(),
            value,
            media_type.to_string(),
            Utc::now(),
        );
        self.store.insert_asset(&record).await?;
        Ok(record)
    }

    /// Fulfil a `PENDING` promise. A file payload is moved into
    /// `generated/<task_id>/` (the caller retains no handle to the source
    /// afterward); an inline payload is stored as `value_content`.
    pub async fn fulfil(
        &self,
        asset_id: &AssetId,
        payload: OutputPayload,
    ) -> Result<AssetRecord, AssetError> {
        let mut record = self.load_pending(asset_id).await?;

        match payload {
            OutputPayload::FilePath(source) => {
                let source = PathBuf::from(source);
                let owner = record
                    .created_by_task
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let dest_dir = self.generated_dir.join(&owner);
                tokio::fs::create_dir_all(&dest_dir).await?;

                let name = source
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("output");
                let dest = dest_dir.join(name);
                move_file(&source, &dest).await?;
                record.fulfil_file(dest, Utc::now());
            }
            OutputPayload::Inline(value) => {
                record.fulfil_value(value, Utc::now());
            }
        }

        self.store.update_asset(&record).await?;
        info!(asset_id = %record.id, kind = %record.kind, "fulfilled asset");
        Ok(record)
    }

    /// Transition a `PENDING` asset to `FAILED(reason)`.
    pub async fn fail(&self, asset_id: &AssetId, reason: &str) -> Result<AssetRecord, AssetError> {
        let mut record = self.load_pending(asset_id).await?;
        record.mark_failed(reason.to_string(), Utc::now());
        self.store.update_asset(&record).await?;
        info!(asset_id = %record.id, reason, "failed asset");
        Ok(record)
    }

    /// Resolve an asset to a concrete file path. `FILE` assets resolve to
    /// their storage path; `VALUE` assets are spilled to a fresh file under
    /// `temp_dir` whose suffix reflects the media type. Returns `None` when
    /// the asset does not exist or is not `AVAILABLE`.
    pub async fn resolve_to_path(
        &self,
        asset_id: &AssetId,
        temp_dir: &Path,
    ) -> Result<Option<PathBuf>, AssetError> {
        let Some(record) = self.store.get_asset(asset_id).await? else {
            return Ok(None);
        };
        if record.status != AssetStatus::Available {
            return Ok(None);
        }

        match record.kind {
            AssetKind::File => Ok(record.storage_path),
            AssetKind::Value => {
                let Some(content) = record.value_content else {
                    return Ok(None);
                };
                let suffix = if record.media_type == "application/json" { ".json" } else { ".txt" };
                let mut file = tempfile::Builder::new()
                    .prefix(&format!("asset_{}_", record.id))
                    .suffix(suffix)
                    .tempfile_in(temp_dir)?;

                match &content {
                    Value::String(s) => file.write_all(s.as_bytes())?,
                    other => file.write_all(serde_json::to_string(other)?.as_bytes())?,
                }
                file.flush()?;

                let path = file
                    .into_temp_path()
                    .keep()
                    .map_err(|e| AssetError::Io(e.error))?;
                debug!(asset_id = %asset_id, path = %path.display(), "spilled value asset");
                Ok(Some(path))
            }
        }
    }

    async fn load_pending(&self, asset_id: &AssetId) -> Result<AssetRecord, AssetError> {
        let record = self
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        if record.status != AssetStatus::Pending {
            return Err(AssetError::TerminalState {
                asset: asset_id.to_string(),
                status: record.status,
            });
        }
        Ok(record)
    }
}

/// Move `source` to `dest`: rename when possible, copy + remove across
/// filesystems.
async fn move_file(source: &Path, dest: &Path) -> Result<(), AssetError> {
    if tokio::fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(source, dest).await?;
    tokio::fs::remove_file(source).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modrun_store::InMemoryStore;
    use serde_json::json;

    fn manager(dir: &Path) -> AssetManager {
        AssetManager::new(Arc::new(InMemoryStore::new()), &dir.join("storage")).unwrap()
    }

    #[tokio::test]
    async fn ingest_copies_into_dated_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sample.txt");
        std::fs::write(&source, "Hello Asset World").unwrap();

        let mgr = manager(dir.path());
        let record = mgr.ingest(&source, "Sample Text", "text/plain").await.unwrap();

        assert_eq!(record.status, AssetStatus::Available);
        assert_eq!(record.kind, AssetKind::File);
        assert_eq!(record.tags, vec!["upload"]);

        let stored = record.storage_path.unwrap();
        assert!(stored.exists());
        let date = Utc::now().format("%Y-%m-%d").to_string();
        assert!(stored.display().to_string().contains(&format!("uploads/{}", date)));
        assert!(stored
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_sample.txt"));
        // Original is copied, not moved.
        assert!(source.exists());
    }

    #[tokio::test]
    async fn ingest_missing_source_creates_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let err = mgr
            .ingest(&dir.path().join("ghost.txt"), "x", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn pending_then_fulfil_moves_into_generated() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let task = TaskId::new("task-999");

        let pending = mgr.create_pending(&task, "Task Output", "video/mp4").await.unwrap();
        assert_eq!(pending.status, AssetStatus::Pending);
        assert_eq!(pending.created_by_task, Some(task.clone()));
        assert_eq!(pending.tags, vec!["task-output"]);

        let produced = dir.path().join("out.mp4");
        std::fs::write(&produced, "DUMMY VIDEO DATA").unwrap();

        let fulfilled = mgr
            .fulfil(&pending.id, OutputPayload::FilePath(produced.display().to_string()))
            .await
            .unwrap();

        assert_eq!(fulfilled.status, AssetStatus::Available);
        let stored = fulfilled.storage_path.unwrap();
        assert!(stored.display().to_string().contains("generated/task-999"));
        assert!(stored.exists());
        assert!(!produced.exists(), "source must be moved, not copied");
    }

    #[tokio::test]
    async fn inline_fulfilment_flips_kind_to_value() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let pending = mgr
            .create_pending(&TaskId::new("t"), "response", "application/json")
            .await
            .unwrap();
        let fulfilled = mgr
            .fulfil(&pending.id, OutputPayload::Inline(json!("Echo: hi")))
            .await
            .unwrap();

        assert_eq!(fulfilled.kind, AssetKind::Value);
        assert_eq!(fulfilled.status, AssetStatus::Available);
        assert_eq!(fulfilled.value_content, Some(json!("Echo: hi")));
    }

    #[tokio::test]
    async fn terminal_assets_cannot_be_mutated() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let value = mgr.create_value("cfg", json!({"a": 1}), "application/json").await.unwrap();
        let err = mgr.fulfil(&value.id, OutputPayload::Inline(json!(2))).await.unwrap_err();
        assert!(matches!(err, AssetError::TerminalState { .. }));

        let pending = mgr.create_pending(&TaskId::new("t"), "p", "text/plain").await.unwrap();
        mgr.fail(&pending.id, "upstream broke").await.unwrap();
        let err = mgr.fail(&pending.id, "again").await.unwrap_err();
        assert!(matches!(err, AssetError::TerminalState { .. }));
    }

    #[tokio::test]
    async fn fail_records_reason() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let pending = mgr.create_pending(&TaskId::new("t"), "p", "text/plain").await.unwrap();
        let failed = mgr.fail(&pending.id, "Task t failed: boom").await.unwrap();

        assert_eq!(failed.status, AssetStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Task t failed: boom"));
    }

    #[tokio::test]
    async fn resolve_value_round_trips_json_content() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let content = json!({"threshold": 0.8, "mode": "fast"});
        let value = mgr.create_value("cfg", content.clone(), "application/json").await.unwrap();

        let temp = dir.path().join("scratch");
        std::fs::create_dir_all(&temp).unwrap();
        let path = mgr.resolve_to_path(&value.id, &temp).await.unwrap().unwrap();

        assert_eq!(path.extension().unwrap(), "json");
        let read: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, content);
    }

    #[tokio::test]
    async fn resolve_string_value_writes_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let value = mgr
            .create_value("msg", json!("Test Message for Engine"), "text/plain")
            .await
            .unwrap();

        let temp = dir.path().join("scratch");
        std::fs::create_dir_all(&temp).unwrap();
        let path = mgr.resolve_to_path(&value.id, &temp).await.unwrap().unwrap();

        assert_eq!(path.extension().unwrap(), "txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Test Message for Engine");
    }

    #[tokio::test]
    async fn resolve_file_returns_storage_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.txt");
        std::fs::write(&source, "x").unwrap();

        let mgr = manager(dir.path());
        let record = mgr.ingest(&source, "in", "text/plain").await.unwrap();

        let path = mgr
            .resolve_to_path(&record.id, dir.path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Some(path), record.storage_path);
    }

    #[tokio::test]
    async fn resolve_refuses_non_available_assets() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());

        let pending = mgr.create_pending(&TaskId::new("t"), "p", "text/plain").await.unwrap();
        assert!(mgr.resolve_to_path(&pending.id, dir.path()).await.unwrap().is_none());
        assert!(mgr
            .resolve_to_path(&AssetId::new("ghost"), dir.path())
            .await
            .unwrap()
            .is_none());
    }
}
