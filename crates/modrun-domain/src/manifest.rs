use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::TaskId;

// ── Execution manifest ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestMode {
    Run,
    Test,
}

/// The document handed to a module on its command line. `mode`, `task_id`
/// and `config` are closed; `inputs` is deliberately open: in run mode it
/// maps contract keys to filesystem paths, in test mode it carries the
/// module's `test_data.json` payload verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionManifest {
    pub mode: ManifestMode,
    pub task_id: String,
    pub inputs: Value,
    pub config: Value,
}

impl ExecutionManifest {
    /// Start a run-mode manifest for `task_id`. Inputs are added one path
    /// at a time through the builder.
    pub fn run(task_id: &TaskId) -> RunManifestBuilder {
        RunManifestBuilder {
            task_id: task_id.to_string(),
            inputs: Map::new(),
            config: json!({}),
        }
    }

    /// Build a self-test manifest. `payload` is the content of the module's
    /// `test_data.json`, bundled into `inputs` as-is.
    pub fn test(payload: Value) -> ExecutionManifest {
        ExecutionManifest {
            mode: ManifestMode::Test,
            task_id: "TEST_RUN".to_string(),
            inputs: payload,
            config: json!({}),
        }
    }
}

pub struct RunManifestBuilder {
    task_id: String,
    inputs: Map<String, Value>,
    config: Value,
}

impl RunManifestBuilder {
    pub fn input(mut self, key: &str, path: &Path) -> Self {
        self.inputs
            .insert(key.to_string(), Value::String(path.display().to_string()));
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ExecutionManifest {
        ExecutionManifest {
            mode: ManifestMode::Run,
            task_id: self.task_id,
            inputs: Value::Object(self.inputs),
            config: self.config,
        }
    }
}

// ── Module results ────────────────────────────────────────────────────────────

/// What a finished module handed back for one declared output slot.
/// ASSET outputs name a file path; VALUE outputs carry the JSON directly.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPayload {
    FilePath(String),
    Inline(Value),
}

/// Locate the output mapping inside a module result: the `outputs` object
/// when present and non-empty, otherwise the result itself (modules may
/// emit their output keys at the top level).
pub fn output_section(result: &Value) -> &Value {
    match result.get("outputs") {
        Some(outputs @ Value::Object(m)) if !m.is_empty() => outputs,
        _ => result,
    }
}

/// Whether a module result reports success (`{"status": "success", ...}`).
pub fn result_is_success(result: &Value) -> bool {
    result.get("status").and_then(Value::as_str) == Some("success")
}
