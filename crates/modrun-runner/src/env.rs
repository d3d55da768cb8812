use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::process::merged_lines;

/// Receives installer output one line at a time, in order, before
/// `install_deps` returns.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn line(&self, line: &str);
}

/// Provisions and locates a module's isolated interpreter environment.
///
/// Failures never surface as errors: `create_env` reports `(false, message)`
/// and `install_deps` reports `false` with the failure captured via the sink.
pub struct EnvironmentManager {
    base_interpreter: String,
}

impl EnvironmentManager {
    /// `base_interpreter` is the interpreter used to bootstrap environments
    /// (`python3` in production).
    pub fn new(base_interpreter: impl Into<String>) -> Self {
        Self { base_interpreter: base_interpreter.into() }
    }

    pub fn env_path(module_dir: &Path) -> PathBuf {
        module_dir.join("venv")
    }

    pub fn interpreter_path(module_dir: &Path) -> PathBuf {
        let env = Self::env_path(module_dir);
        if cfg!(windows) {
            env.join("Scripts").join("python.exe")
        } else {
            env.join("bin").join("python")
        }
    }

    /// Create the isolated environment at `<module_dir>/venv`. A pre-existing
    /// environment is left untouched and reported as success.
    pub async fn create_env(&self, module_dir: &Path) -> (bool, String) {
        let env_path = Self::env_path(module_dir);
        if env_path.exists() {
            return (true, format!("environment already present at {}", env_path.display()));
        }

        info!(module_dir = %module_dir.display(), "creating module environment");
        let output = Command::new(&self.base_interpreter)
            .arg("-m")
            .arg("venv")
            .arg(&env_path)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                (true, format!("created environment at {}", env_path.display()))
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                (
                    false,
                    format!(
                        "failed to create environment (exit code {}): {}",
                        out.status.code().unwrap_or(-1),
                        stderr.trim()
                    ),
                )
            }
            Err(e) => (false, format!("failed to create environment: {}", e)),
        }
    }

    /// Install the module's declared dependencies with its own interpreter,
    /// the module directory as working directory. A missing declaration file
    /// is success without side effect.
    pub async fn install_deps(&self, module_dir: &Path, sink: &dyn LogSink) -> bool {
        if !module_dir.join("requirements.txt").exists() {
            sink.line("no requirements.txt found, skipping dependency install").await;
            return true;
        }

        let interpreter = Self::interpreter_path(module_dir);
        info!(module_dir = %module_dir.display(), "installing module dependencies");

        let mut cmd = Command::new(&interpreter);
        cmd.args(["-m", "pip", "install", "-r", "requirements.txt"])
            .current_dir(module_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                sink.line(&format!("dependency install failed to start: {}", e)).await;
                return false;
            }
        };

        let mut lines = merged_lines(&mut child);
        while let Some(line) = lines.recv().await {
            debug!(target: "modrun::install", "{}", line);
            sink.line(&line).await;
        }

        match child.wait().await {
            Ok(status) => status.success(),
            Err(e) => {
                sink.line(&format!("dependency install crashed: {}", e)).await;
                false
            }
        }
    }
}
