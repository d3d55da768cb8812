use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

/// Which document store backs the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Volatile, per-process. Scratch runs and tests.
    Memory,
    /// Embedded redb database file.
    Redb { path: PathBuf },
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory scanned for module subdirectories.
    pub modules_root: PathBuf,
    /// Root of the managed asset storage (`uploads/`, `generated/`).
    pub storage_root: PathBuf,
    pub store: StoreBackend,
    pub bind: String,
    pub port: u16,
    /// Number of parallel execution workers.
    pub workers: usize,
    /// Sleep between engine polls when the queue is empty.
    pub poll_interval_ms: u64,
    /// Task timeout when the task config carries none.
    pub default_timeout_secs: u64,
    /// Interpreter used to create module environments.
    pub base_interpreter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            modules_root: PathBuf::from("modules"),
            storage_root: PathBuf::from("storage"),
            store: StoreBackend::Redb { path: PathBuf::from("modrun.redb") },
            bind: "127.0.0.1".to_string(),
            port: 8000,
            workers: 1,
            poll_interval_ms: 500,
            default_timeout_secs: 600,
            base_interpreter: "python3".to_string(),
        }
    }
}

/// On-disk shape of `modrun.yml`. Every field is optional; absent fields
/// fall back to defaults, then env overrides apply on top.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    modules_root: Option<PathBuf>,
    storage_root: Option<PathBuf>,
    store: Option<String>,
    store_path: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
    poll_interval_ms: Option<u64>,
    default_timeout_secs: Option<u64>,
    base_interpreter: Option<String>,
}

/// Load configuration: defaults ← `modrun.yml` (when present) ← `MODRUN_*`
/// environment variables.
pub fn load(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut raw = RawConfig::default();

    if let Some(path) = path {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        raw = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.display().to_string(),
            source: e,
        })?;
        debug!("loaded config from {}", path.display());
    } else if Path::new("modrun.yml").exists() {
        return load(Some(Path::new("modrun.yml")));
    }

    apply_env(&mut raw)?;
    resolve(raw)
}

fn apply_env(raw: &mut RawConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var("MODRUN_MODULES_ROOT") {
        raw.modules_root = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("MODRUN_STORAGE_ROOT") {
        raw.storage_root = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("MODRUN_STORE") {
        raw.store = Some(v);
    }
    if let Ok(v) = std::env::var("MODRUN_STORE_PATH") {
        raw.store_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("MODRUN_BIND") {
        raw.bind = Some(v);
    }
    if let Ok(v) = std::env::var("MODRUN_PORT") {
        let parsed = v
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid(format!("MODRUN_PORT: '{}' is not a port", v)))?;
        raw.port = Some(parsed);
    }
    if let Ok(v) = std::env::var("MODRUN_WORKERS") {
        let parsed = v
            .parse::<usize>()
            .map_err(|_| ConfigError::Invalid(format!("MODRUN_WORKERS: '{}' is not a count", v)))?;
        raw.workers = Some(parsed);
    }
    if let Ok(v) = std::env::var("MODRUN_POLL_INTERVAL_MS") {
        let parsed = v.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!("MODRUN_POLL_INTERVAL_MS: '{}' is not a duration", v))
        })?;
        raw.poll_interval_ms = Some(parsed);
    }
    if let Ok(v) = std::env::var("MODRUN_DEFAULT_TIMEOUT_SECS") {
        let parsed = v.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!("MODRUN_DEFAULT_TIMEOUT_SECS: '{}' is not a duration", v))
        })?;
        raw.default_timeout_secs = Some(parsed);
    }
    if let Ok(v) = std::env::var("MODRUN_BASE_INTERPRETER") {
        raw.base_interpreter = Some(v);
    }
    Ok(())
}

fn resolve(raw: RawConfig) -> Result<ServiceConfig, ConfigError> {
    let defaults = ServiceConfig::default();

    let store = match raw.store.as_deref() {
        None => defaults.store,
        Some("memory") => StoreBackend::Memory,
        Some("redb") => StoreBackend::Redb {
            path: raw.store_path.unwrap_or_else(|| PathBuf::from("modrun.redb")),
        },
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "unknown store backend '{}' (expected 'memory' or 'redb')",
                other
            )))
        }
    };

    let workers = raw.workers.unwrap_or(defaults.workers);
    if workers == 0 {
        return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
    }

    Ok(ServiceConfig {
        modules_root: raw.modules_root.unwrap_or(defaults.modules_root),
        storage_root: raw.storage_root.unwrap_or(defaults.storage_root),
        store,
        bind: raw.bind.unwrap_or(defaults.bind),
        port: raw.port.unwrap_or(defaults.port),
        workers,
        poll_interval_ms: raw.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        default_timeout_secs: raw.default_timeout_secs.unwrap_or(defaults.default_timeout_secs),
        base_interpreter: raw.base_interpreter.unwrap_or(defaults.base_interpreter),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modrun.yml");
        std::fs::write(
            &path,
            "modules_root: /srv/modules\nstore: memory\nworkers: 4\nport: 9100\n",
        )
        .unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.modules_root, PathBuf::from("/srv/modules"));
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.port, 9100);
        // untouched fields keep defaults
        assert_eq!(cfg.default_timeout_secs, 600);
    }

    #[test]
    fn unknown_store_backend_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modrun.yml");
        std::fs::write(&path, "store: mongodb\n").unwrap();

        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modrun.yml");
        std::fs::write(&path, "workers: 0\n").unwrap();

        assert!(matches!(load(Some(&path)).unwrap_err(), ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modrun.yml");
        std::fs::write(&path, "workers: [not a number\n").unwrap();

        assert!(matches!(load(Some(&path)).unwrap_err(), ConfigError::YamlParse { .. }));
    }
}
