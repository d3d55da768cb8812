use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use modrun_assets::AssetManager;
use modrun_domain::{AssetId, AssetStatus, ContractType, ModuleId, TaskId, TaskStatus};
use modrun_store::{DocumentStore, TaskRecord};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, SubmitError};
use crate::events::AssetEvents;

/// What a successful submission hands back to the caller.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub outputs: BTreeMap<String, AssetId>,
}

/// Validates task contracts, materialises output promises, and promotes
/// blocked tasks as their inputs become available.
pub struct TaskOrchestrator {
    store: Arc<dyn DocumentStore>,
    assets: Arc<AssetManager>,
}

impl TaskOrchestrator {
    pub fn new(store: Arc<dyn DocumentStore>, assets: Arc<AssetManager>) -> Self {
        Self { store, assets }
    }

    /// Validate `input_map` against the module contract and persist the task
    /// with one `PENDING` promise per declared output.
    ///
    /// Rejection happens before any side effect: a refused submission leaves
    /// no task record and no orphan promises. Module availability is not
    /// checked here; a task against a non-`AVAILABLE` module queues and
    /// fails at dispatch.
    pub async fn submit(
        &self,
        module_id: &ModuleId,
        input_map: &BTreeMap<String, String>,
        config: Option<Value>,
    ) -> Result<SubmitReceipt, SubmitError> {
        let module = self
            .store
            .get_module(module_id)
            .await?
            .ok_or_else(|| SubmitError::ModuleNotFound(module_id.to_string()))?;

        // Validate every declared input and collect blockers.
        let mut blocking_assets: Vec<AssetId> = Vec::new();
        let mut validated: BTreeMap<String, AssetId> = BTreeMap::new();

        for spec in &module.config.inputs {
            let key = &spec.key;
            let raw_id = input_map
                .get(key)
                .ok_or_else(|| SubmitError::MissingInput { key: key.clone() })?;
            let asset_id = AssetId::new(raw_id.clone());

            let asset = self.store.get_asset(&asset_id).await?.ok_or_else(|| {
                SubmitError::AssetNotFound { key: key.clone(), asset: asset_id.to_string() }
            })?;

            if asset.status == AssetStatus::Failed {
                return Err(SubmitError::AssetFailed {
                    key: key.clone(),
                    asset: asset_id.to_string(),
                });
            }

            if spec.contract_type == ContractType::Asset {
                if let Some(constraints) = &spec.constraints {
                    if !constraints.media_types.is_empty()
                        && !constraints.media_types.contains(&asset.media_type)
                    {
                        return Err(SubmitError::MediaTypeRejected {
                            key: key.clone(),
                            asset: asset_id.to_string(),
                            media_type: asset.media_type.clone(),
                            allowed: constraints.media_types.clone(),
                        });
                    }
                }
            }

            if asset.status == AssetStatus::Pending {
                blocking_assets.push(asset_id.clone());
            }
            validated.insert(key.clone(), asset_id);
        }

        // Validation passed; side effects start here.
        let task_id = TaskId::new(Uuid::new_v4().to_string());

        let mut output_map: BTreeMap<String, AssetId> = BTreeMap::new();
        for spec in &module.config.outputs {
            let label = spec
                .label
                .clone()
                .unwrap_or_else(|| format!("{}_output", spec.key));
            let media_type = spec
                .media_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let promise = self.assets.create_pending(&task_id, &label, &media_type).await?;
            output_map.insert(spec.key.clone(), promise.id);
        }

        let task = TaskRecord::new(
            task_id.clone(),
            module_id.clone(),
            validated,
            output_map.clone(),
            config.unwrap_or_else(|| json!({})),
            blocking_assets,
            Utc::now(),
        );
        self.store.insert_task(&task).await?;
        info!(task_id = %task.id, module_id = %module_id, status = %task.status, "task submitted");

        Ok(SubmitReceipt { task_id, status: task.status, outputs: output_map })
    }

    /// An asset became `AVAILABLE`: drop it from the blocker list of every
    /// `BLOCKED` task that lists it, promoting drained tasks to `QUEUED`.
    /// Idempotent with respect to repeated delivery.
    pub async fn on_asset_available(&self, asset: &AssetId) -> Result<(), EngineError> {
        let blocked = self.store.find_blocked_by_asset(asset).await?;
        for mut task in blocked {
            if task.unblock(asset, Utc::now()) {
                if task.status == TaskStatus::Queued {
                    info!(task_id = %task.id, "task promoted to QUEUED");
                }
                self.store.update_task(&task).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AssetEvents for TaskOrchestrator {
    async fn on_asset_available(&self, asset: &AssetId) -> Result<(), EngineError> {
        TaskOrchestrator::on_asset_available(self, asset).await
    }
}
