use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::process::merged_lines;

/// What a module invocation produced. `success` is exit code 0; `result` is
/// the last stdout line that parsed as a JSON object, independent of the
/// exit code; `error` is set on any failure.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub logs: Vec<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl RunOutcome {
    fn failed(error: String, logs: Vec<String>, result: Option<Value>) -> Self {
        Self { success: false, logs, result, error: Some(error) }
    }
}

/// Executes a module as a subprocess:
/// `<interpreter> <script> --manifest <manifest_path>`.
///
/// This is the sole coupling between the orchestrator and any module: the
/// module is a CLI that consumes a manifest file and emits one JSON object
/// on its standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleRunner;

impl ModuleRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &self,
        interpreter: &Path,
        script: &Path,
        manifest_path: &Path,
        timeout: Duration,
    ) -> RunOutcome {
        info!(
            interpreter = %interpreter.display(),
            script = %script.display(),
            "invoking module"
        );

        let mut cmd = Command::new(interpreter);
        cmd.arg(script)
            .arg("--manifest")
            .arg(manifest_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error = format!("Execution failed: {}", e);
                return RunOutcome::failed(error.clone(), vec![error], None);
            }
        };

        // stderr is merged into stdout; every line is kept verbatim and
        // mirrored to our own log output.
        let mut rx = merged_lines(&mut child);
        let mut logs: Vec<String> = Vec::new();
        let collect = async {
            while let Some(line) = rx.recv().await {
                debug!(target: "modrun::module", "{}", line);
                logs.push(line);
            }
        };

        if tokio::time::timeout(timeout, collect).await.is_err() {
            let _ = child.kill().await;
            warn!(script = %script.display(), "module run timed out");
            let error = "Process timed out".to_string();
            logs.push(error.clone());
            return RunOutcome::failed(error, logs, None);
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                let error = format!("Execution failed: {}", e);
                logs.push(error.clone());
                return RunOutcome::failed(error, logs, None);
            }
        };

        let result = extract_result(&logs);
        let code = status.code().unwrap_or(-1);
        if code == 0 {
            RunOutcome { success: true, logs, result, error: None }
        } else {
            warn!(script = %script.display(), code, "module exited non-zero");
            RunOutcome::failed(format!("Process exited with code {}", code), logs, result)
        }
    }
}

/// Scan captured lines in reverse; the first one parsing as a JSON object is
/// the module's result. Non-JSON lines are plain logs and are skipped.
fn extract_result(logs: &[String]) -> Option<Value> {
    for line in logs.iter().rev() {
        if let Ok(value) = serde_json::from_str::<Value>(line) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("main.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn manifest(dir: &Path) -> PathBuf {
        let path = dir.join("manifest.json");
        std::fs::write(&path, "{}").unwrap();
        path
    }

    #[tokio::test]
    async fn last_json_object_line_wins() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "#!/bin/sh\necho starting up\necho '{\"status\":\"success\",\"n\":1}'\necho '{\"status\":\"success\",\"n\":2}'\necho done\n",
        );

        let outcome = ModuleRunner::new()
            .run(&sh(), &script, &manifest(dir.path()), Duration::from_secs(5))
            .await;

        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.result.unwrap()["n"], 2);
        assert_eq!(outcome.logs.len(), 4);
    }

    #[tokio::test]
    async fn non_object_json_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "#!/bin/sh\necho '{\"status\":\"success\"}'\necho '[1,2,3]'\necho '42'\n",
        );

        let outcome = ModuleRunner::new()
            .run(&sh(), &script, &manifest(dir.path()), Duration::from_secs(5))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.result.unwrap()["status"], "success");
    }

    #[tokio::test]
    async fn no_json_at_all_gives_no_result() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "#!/bin/sh\necho hello\n");

        let outcome = ModuleRunner::new()
            .run(&sh(), &script, &manifest(dir.path()), Duration::from_secs(5))
            .await;

        assert!(outcome.success);
        assert!(outcome.result.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "#!/bin/sh\necho boom\nexit 3\n");

        let outcome = ModuleRunner::new()
            .run(&sh(), &script, &manifest(dir.path()), Duration::from_secs(5))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Process exited with code 3"));
        assert_eq!(outcome.logs, vec!["boom"]);
    }

    #[tokio::test]
    async fn stderr_is_merged_into_logs() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "#!/bin/sh\necho to-stderr 1>&2\necho '{\"status\":\"success\"}'\n");

        let outcome = ModuleRunner::new()
            .run(&sh(), &script, &manifest(dir.path()), Duration::from_secs(5))
            .await;

        assert!(outcome.success);
        assert!(outcome.logs.contains(&"to-stderr".to_string()));
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "#!/bin/sh\nsleep 10\n");

        let started = std::time::Instant::now();
        let outcome = ModuleRunner::new()
            .run(&sh(), &script, &manifest(dir.path()), Duration::from_millis(300))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Process timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(outcome.logs.iter().any(|l| l == "Process timed out"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "#!/bin/sh\n");

        let outcome = ModuleRunner::new()
            .run(
                Path::new("/nonexistent/interpreter"),
                &script,
                &manifest(dir.path()),
                Duration::from_secs(5),
            )
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Execution failed"));
    }
}
