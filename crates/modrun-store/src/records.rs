use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use modrun_domain::{
    AssetId, AssetKind, AssetStatus, Capabilities, ModuleId, ModuleManifest, ModuleStatus, TaskId,
    TaskStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── ModuleRecord ──────────────────────────────────────────────────────────────

/// An installed, versioned computation unit as persisted in the registry.
///
/// `interpreter_path` and `env_path` are only set once the module reaches
/// `AVAILABLE`; `version_hash` is the content hash at the time of the last
/// transition into `AVAILABLE` (or the last detection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: ModuleId,
    pub status: ModuleStatus,
    pub path: PathBuf,
    pub version_hash: String,
    pub config: ModuleManifest,
    pub capabilities: Capabilities,
    pub interpreter_path: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
    pub installation_logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModuleRecord {
    /// A freshly discovered module, not yet installed.
    pub fn detected(
        path: PathBuf,
        version_hash: String,
        config: ModuleManifest,
        now: DateTime<Utc>,
    ) -> Self {
        let capabilities = config.capabilities();
        Self {
            id: ModuleId::new(config.name.clone()),
            status: ModuleStatus::Detected,
            path,
            version_hash,
            config,
            capabilities,
            interpreter_path: None,
            env_path: None,
            installation_logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The on-disk content changed: back to `DETECTED` with a fresh config
    /// snapshot and cleared logs, ready for reinstall.
    pub fn redetect(&mut self, version_hash: String, config: ModuleManifest, now: DateTime<Utc>) {
        self.status = ModuleStatus::Detected;
        self.version_hash = version_hash;
        self.capabilities = config.capabilities();
        self.config = config;
        self.interpreter_path = None;
        self.env_path = None;
        self.installation_logs.clear();
        self.updated_at = now;
    }

    pub fn mark_installing(&mut self, now: DateTime<Utc>) {
        self.status = ModuleStatus::Installing;
        self.updated_at = now;
    }

    pub fn mark_testing(&mut self, now: DateTime<Utc>) {
        self.status = ModuleStatus::Testing;
        self.updated_at = now;
    }

    pub fn mark_available(
        &mut self,
        interpreter_path: PathBuf,
        env_path: PathBuf,
        now: DateTime<Utc>,
    ) {
        self.status = ModuleStatus::Available;
        self.interpreter_path = Some(interpreter_path);
        self.env_path = Some(env_path);
        self.updated_at = now;
    }

    pub fn mark_error(&mut self, now: DateTime<Utc>) {
        self.status = ModuleStatus::Error;
        self.updated_at = now;
    }
}

// ── AssetRecord ───────────────────────────────────────────────────────────────

/// A datum tracked through the `PENDING → AVAILABLE | FAILED` lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub label: String,
    pub kind: AssetKind,
    pub status: AssetStatus,
    pub media_type: String,
    pub storage_path: Option<PathBuf>,
    pub value_content: Option<Value>,
    pub created_by_task: Option<TaskId>,
    pub tags: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecord {
    /// A file copied into managed storage, immediately `AVAILABLE`.
    pub fn ingested(
        id: AssetId,
        label: String,
        media_type: String,
        storage_path: PathBuf,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            label,
            kind: AssetKind::File,
            status: AssetStatus::Available,
            media_type,
            storage_path: Some(storage_path),
            value_content: None,
            created_by_task: None,
            tags: vec!["upload".to_string()],
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A promise: the output slot of a task that has not run yet.
    pub fn pending(
        id: AssetId,
        task: TaskId,
        label: String,
        media_type: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            label,
            kind: AssetKind::File,
            status: AssetStatus::Pending,
            media_type,
            storage_path: None,
            value_content: None,
            created_by_task: Some(task),
            tags: vec!["task-output".to_string()],
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An inline value, immediately `AVAILABLE`.
    pub fn value(
        id: AssetId,
        label: String,
        value: Value,
        media_type: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            label,
            kind: AssetKind::Value,
            status: AssetStatus::Available,
            media_type,
            storage_path: None,
            value_content: Some(value),
            created_by_task: None,
            tags: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn fulfil_file(&mut self, storage_path: PathBuf, now: DateTime<Utc>) {
        self.status = AssetStatus::Available;
        self.kind = AssetKind::File;
        self.storage_path = Some(storage_path);
        self.updated_at = now;
    }

    /// Inline fulfilment flips the kind to VALUE so that
    /// `AVAILABLE + VALUE ⇒ value_content` holds.
    pub fn fulfil_value(&mut self, value: Value, now: DateTime<Utc>) {
        self.status = AssetStatus::Available;
        self.kind = AssetKind::Value;
        self.value_content = Some(value);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = AssetStatus::Failed;
        self.error = Some(reason);
        self.updated_at = now;
    }
}

// ── TaskRecord ────────────────────────────────────────────────────────────────

/// One planned invocation of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub module_id: ModuleId,
    pub status: TaskStatus,
    pub input_map: BTreeMap<String, AssetId>,
    pub output_map: BTreeMap<String, AssetId>,
    pub config: Value,
    pub blocking_assets: Vec<AssetId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_log: Option<String>,
    pub logs: Vec<String>,
}

impl TaskRecord {
    /// A new task: `BLOCKED` when any input is still pending, else `QUEUED`.
    pub fn new(
        id: TaskId,
        module_id: ModuleId,
        input_map: BTreeMap<String, AssetId>,
        output_map: BTreeMap<String, AssetId>,
        config: Value,
        blocking_assets: Vec<AssetId>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if blocking_assets.is_empty() {
            TaskStatus::Queued
        } else {
            TaskStatus::Blocked
        };
        Self {
            id,
            module_id,
            status,
            input_map,
            output_map,
            config,
            blocking_assets,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            error_log: None,
            logs: Vec::new(),
        }
    }

    /// Drop `asset` from the blocker list, promoting to `QUEUED` once the
    /// list drains. Returns false when the asset was not a blocker (the
    /// event was already processed).
    pub fn unblock(&mut self, asset: &AssetId, now: DateTime<Utc>) -> bool {
        let before = self.blocking_assets.len();
        self.blocking_assets.retain(|a| a != asset);
        if self.blocking_assets.len() == before {
            return false;
        }
        if self.blocking_assets.is_empty() {
            self.status = TaskStatus::Queued;
        }
        self.updated_at = now;
        true
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, logs: Vec<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.logs = logs;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error: String, logs: Vec<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error_log = Some(error);
        self.logs = logs;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Per-task timeout override from `config.timeout` (seconds).
    pub fn timeout_secs(&self, default: u64) -> u64 {
        self.config
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }
}
