use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use modrun_domain::{result_is_success, ExecutionManifest, ModuleId, ModuleStatus};
use modrun_runner::{EnvironmentManager, LogSink, ModuleRunner};
use modrun_store::{DocumentStore, ModuleRecord};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::scanner::ModuleScanner;

const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives the module lifecycle state machine:
/// `DETECTED → INSTALLING → TESTING → AVAILABLE`, with `ERROR` absorbing any
/// environment or self-test failure. Every transition is persisted; lifecycle
/// errors never propagate upward, they are only revealed through the record.
pub struct RegistryOrchestrator {
    modules_root: PathBuf,
    store: Arc<dyn DocumentStore>,
    scanner: ModuleScanner,
    env: EnvironmentManager,
    runner: ModuleRunner,
}

impl RegistryOrchestrator {
    pub fn new(
        modules_root: PathBuf,
        store: Arc<dyn DocumentStore>,
        base_interpreter: &str,
    ) -> Self {
        Self {
            modules_root,
            store,
            scanner: ModuleScanner::new(),
            env: EnvironmentManager::new(base_interpreter),
            runner: ModuleRunner::new(),
        }
    }

    /// Scan the modules root and reconcile the registry with what is on
    /// disk. Idempotent: an unchanged tree leaves records untouched.
    pub async fn discover_and_register(&self) -> Result<(), RegistryError> {
        info!(root = %self.modules_root.display(), "scanning modules");
        for (dir_name, path) in self.scanner.scan(&self.modules_root) {
            self.process_module(&dir_name, &path).await?;
        }
        Ok(())
    }

    async fn process_module(&self, dir_name: &str, path: &Path) -> Result<(), RegistryError> {
        let Some(manifest) = self.scanner.validate(path) else {
            info!(dir_name, "skipping directory: not a valid module");
            return Ok(());
        };

        let id = ModuleId::new(manifest.name.clone());
        let current_hash = self.scanner.content_hash(path);

        let candidate = match self.store.get_module(&id).await? {
            None => {
                info!(module_id = %id, "new module detected");
                let record =
                    ModuleRecord::detected(path.to_path_buf(), current_hash, manifest, Utc::now());
                self.store.upsert_module(&record).await?;
                Some(record)
            }
            Some(mut record) if record.version_hash != current_hash => {
                info!(module_id = %id, "module content changed, reinstalling");
                record.redetect(current_hash, manifest, Utc::now());
                record.path = path.to_path_buf();
                self.store.upsert_module(&record).await?;
                Some(record)
            }
            Some(record)
                if matches!(
                    record.status,
                    ModuleStatus::Error | ModuleStatus::Detected | ModuleStatus::Installing
                ) =>
            {
                info!(module_id = %id, status = %record.status, "retrying module install");
                Some(record)
            }
            // AVAILABLE or TESTING with an unchanged hash: nothing to do.
            Some(_) => None,
        };

        if let Some(record) = candidate {
            self.install(record).await?;
        }
        Ok(())
    }

    async fn install(&self, mut record: ModuleRecord) -> Result<(), RegistryError> {
        record.mark_installing(Utc::now());
        self.store.upsert_module(&record).await?;

        let (ok, message) = self.env.create_env(&record.path).await;
        self.log(&record.id, &format!("[setup] {}", message)).await?;
        if !ok {
            return self.to_error(record).await;
        }

        let sink = InstallLogSink { store: self.store.as_ref(), id: record.id.clone() };
        if !self.env.install_deps(&record.path, &sink).await {
            self.log(&record.id, "[setup] dependency install failed").await?;
            return self.to_error(record).await;
        }

        record.mark_testing(Utc::now());
        self.store.upsert_module(&record).await?;
        self.self_test(record).await
    }

    /// Run the module once against the payload in its mandatory
    /// `test_data.json`. The payload is bundled verbatim into the manifest's
    /// `inputs` field, matching what existing modules expect in test mode.
    async fn self_test(&self, mut record: ModuleRecord) -> Result<(), RegistryError> {
        let test_file = record.path.join("test_data.json");
        let payload = match std::fs::read_to_string(&test_file) {
            Err(_) => {
                self.log(&record.id, "[test] missing test_data.json").await?;
                return self.to_error(record).await;
            }
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(value) => value,
                Err(e) => {
                    self.log(&record.id, &format!("[test] invalid test_data.json: {}", e)).await?;
                    return self.to_error(record).await;
                }
            },
        };

        let manifest = ExecutionManifest::test(payload);
        let mut manifest_file = tempfile::Builder::new()
            .prefix("test_manifest_")
            .suffix(".json")
            .tempfile()?;
        manifest_file.write_all(&serde_json::to_vec(&manifest)?)?;
        manifest_file.flush()?;

        let interpreter = EnvironmentManager::interpreter_path(&record.path);
        let script = record.path.join(&record.config.entry_point);
        let outcome = self
            .runner
            .run(&interpreter, &script, manifest_file.path(), SELF_TEST_TIMEOUT)
            .await;
        drop(manifest_file); // temporary manifest is deleted here

        for line in &outcome.logs {
            self.log(&record.id, &format!("[test output] {}", line)).await?;
        }

        let passed =
            outcome.success && outcome.result.as_ref().map(result_is_success).unwrap_or(false);

        if passed {
            let env_path = EnvironmentManager::env_path(&record.path);
            record.mark_available(interpreter, env_path, Utc::now());
            self.store.upsert_module(&record).await?;
            info!(module_id = %record.id, "module is now AVAILABLE");
            return Ok(());
        }

        let reason = if !outcome.success {
            format!("[test] execution failed: {}", outcome.error.unwrap_or_default())
        } else {
            match &outcome.result {
                Some(result) => format!("[test] validation failed, result: {}", result),
                None => "[test] validation failed: module emitted no result".to_string(),
            }
        };
        self.log(&record.id, &reason).await?;
        self.to_error(record).await
    }

    async fn log(&self, id: &ModuleId, line: &str) -> Result<(), RegistryError> {
        self.store.append_install_log(id, line).await?;
        Ok(())
    }

    async fn to_error(&self, mut record: ModuleRecord) -> Result<(), RegistryError> {
        record.mark_error(Utc::now());
        self.store.upsert_module(&record).await?;
        warn!(module_id = %record.id, "module transitioned to ERROR");
        Ok(())
    }
}

/// Streams installer output into the module's `installation_logs`.
struct InstallLogSink<'a> {
    store: &'a dyn DocumentStore,
    id: ModuleId,
}

#[async_trait]
impl LogSink for InstallLogSink<'_> {
    async fn line(&self, line: &str) {
        if let Err(e) = self.store.append_install_log(&self.id, &format!("[pip] {}", line)).await {
            warn!(module_id = %self.id, error = %e, "failed to persist install log line");
        }
    }
}
