use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use modrun_assets::AssetManager;
use modrun_domain::{
    output_section, AssetId, AssetStatus, ContractType, ExecutionManifest, ModuleStatus,
    OutputPayload,
};
use modrun_runner::{ModuleRunner, RunOutcome};
use modrun_store::{DocumentStore, ModuleRecord, TaskRecord};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::events::AssetEvents;

/// Stateless consumer of runnable tasks. Each `run_once` claims at most one
/// `QUEUED` task, executes its module, settles every output promise, and
/// cascades asset-available events through the [`AssetEvents`] seam.
///
/// Tasks are never retried; `RUNNING` records found after a crash are left
/// untouched.
pub struct ExecutionEngine {
    store: Arc<dyn DocumentStore>,
    assets: Arc<AssetManager>,
    events: Arc<dyn AssetEvents>,
    runner: ModuleRunner,
    default_timeout_secs: u64,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        assets: Arc<AssetManager>,
        events: Arc<dyn AssetEvents>,
        default_timeout_secs: u64,
    ) -> Self {
        Self { store, assets, events, runner: ModuleRunner::new(), default_timeout_secs }
    }

    /// One poll iteration. Returns true iff a task was processed.
    pub async fn run_once(&self) -> Result<bool, EngineError> {
        // The claim is an atomic QUEUED → RUNNING pop on the store.
        let Some(mut task) = self.store.claim_next_queued().await? else {
            return Ok(false);
        };
        info!(task_id = %task.id, module_id = %task.module_id, "claimed task");

        let module = match self.store.get_module(&task.module_id).await? {
            Some(m) if m.status == ModuleStatus::Available && m.interpreter_path.is_some() => m,
            _ => {
                let msg = format!("Module {} is not AVAILABLE", task.module_id);
                self.fail_task(&mut task, msg, Vec::new()).await?;
                return Ok(true);
            }
        };

        // Task-scoped scratch directory: VALUE inputs are spilled here and
        // the whole tree goes away when it drops.
        let inputs_dir = match tempfile::Builder::new()
            .prefix(&format!("task_{}_", task.id))
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => {
                self.fail_task(&mut task, format!("Could not create scratch directory: {}", e), Vec::new())
                    .await?;
                return Ok(true);
            }
        };

        let mut builder = ExecutionManifest::run(&task.id);
        for (key, asset_id) in &task.input_map {
            let resolved = match self.assets.resolve_to_path(asset_id, inputs_dir.path()).await {
                Ok(Some(path)) => path,
                Ok(None) => {
                    let msg = format!("Could not resolve input asset {} for key '{}'", asset_id, key);
                    self.fail_task(&mut task, msg, Vec::new()).await?;
                    return Ok(true);
                }
                Err(e) => {
                    let msg = format!(
                        "Could not resolve input asset {} for key '{}': {}",
                        asset_id, key, e
                    );
                    self.fail_task(&mut task, msg, Vec::new()).await?;
                    return Ok(true);
                }
            };
            builder = builder.input(key, &resolved);
        }
        let manifest = builder.config(task.config.clone()).build();

        let manifest_file = match self.write_manifest(&task, &manifest) {
            Ok(file) => file,
            Err(e) => {
                self.fail_task(&mut task, format!("Could not write manifest: {}", e), Vec::new())
                    .await?;
                return Ok(true);
            }
        };

        let timeout = Duration::from_secs(task.timeout_secs(self.default_timeout_secs));
        let script = module.path.join(&module.config.entry_point);
        let interpreter = module.interpreter_path.clone().unwrap_or_default();

        let outcome = self
            .runner
            .run(&interpreter, &script, manifest_file.path(), timeout)
            .await;
        drop(manifest_file); // manifest temp file removed

        if outcome.success {
            self.finalize_success(&mut task, &module, outcome).await?;
        } else {
            let error = outcome
                .error
                .unwrap_or_else(|| "unknown execution error".to_string());
            self.fail_task(&mut task, error, outcome.logs).await?;
        }

        drop(inputs_dir); // best-effort cleanup of spilled inputs
        Ok(true)
    }

    fn write_manifest(
        &self,
        task: &TaskRecord,
        manifest: &ExecutionManifest,
    ) -> Result<tempfile::NamedTempFile, EngineError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("manifest_{}_", task.id))
            .suffix(".json")
            .tempfile()?;
        file.write_all(&serde_json::to_vec(manifest)?)?;
        file.flush()?;
        Ok(file)
    }

    /// Settle each declared output from the module result, then complete the
    /// task and cascade the asset-available events. Every output transition
    /// precedes the task's terminal transition; cascades come after it.
    async fn finalize_success(
        &self,
        task: &mut TaskRecord,
        module: &ModuleRecord,
        outcome: RunOutcome,
    ) -> Result<(), EngineError> {
        let result = outcome.result.unwrap_or(Value::Null);
        let outputs = output_section(&result);

        for (key, asset_id) in &task.output_map {
            match outputs.get(key).filter(|v| !v.is_null()) {
                Some(value) => {
                    let contract = module
                        .config
                        .output(key)
                        .map(|o| o.contract_type)
                        .unwrap_or(ContractType::Value);
                    let payload = match contract {
                        ContractType::Asset => {
                            // The value names a file path produced by the module.
                            let path = value
                                .as_str()
                                .map(str::to_string)
                                .unwrap_or_else(|| value.to_string());
                            OutputPayload::FilePath(path)
                        }
                        ContractType::Value => OutputPayload::Inline(value.clone()),
                    };
                    if let Err(e) = self.assets.fulfil(asset_id, payload).await {
                        self.fail_output(asset_id, &format!("Fulfillment failed: {}", e)).await;
                    }
                }
                None => {
                    self.fail_output(
                        asset_id,
                        &format!("Module did not provide output for key: {}", key),
                    )
                    .await;
                }
            }
        }

        task.mark_completed(outcome.logs, Utc::now());
        self.store.update_task(task).await?;
        info!(task_id = %task.id, "task completed");

        for asset_id in task.output_map.values() {
            let available = matches!(
                self.store.get_asset(asset_id).await?,
                Some(a) if a.status == AssetStatus::Available
            );
            if available {
                if let Err(e) = self.events.on_asset_available(asset_id).await {
                    warn!(asset_id = %asset_id, error = %e, "asset-available cascade failed");
                }
            }
        }
        Ok(())
    }

    /// Fail every output promise with a reason naming the parent task, then
    /// transition the task itself. Failure is terminal; nothing cascades.
    async fn fail_task(
        &self,
        task: &mut TaskRecord,
        error: String,
        logs: Vec<String>,
    ) -> Result<(), EngineError> {
        warn!(task_id = %task.id, error = %error, "task failed");
        for asset_id in task.output_map.values() {
            self.fail_output(asset_id, &format!("Task {} failed: {}", task.id, error)).await;
        }
        task.mark_failed(error, logs, Utc::now());
        self.store.update_task(task).await?;
        Ok(())
    }

    async fn fail_output(&self, asset_id: &AssetId, reason: &str) {
        if let Err(e) = self.assets.fail(asset_id, reason).await {
            warn!(asset_id = %asset_id, error = %e, "could not mark output asset FAILED");
        }
    }
}
