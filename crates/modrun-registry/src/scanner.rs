use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use modrun_domain::ModuleManifest;
use sha2::{Digest, Sha256};

pub const MANIFEST_FILE: &str = "module.json";
pub const ENTRY_SCRIPT: &str = "main.py";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Walks the modules root and validates candidate directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleScanner;

impl ModuleScanner {
    pub fn new() -> Self {
        Self
    }

    /// Immediate subdirectories of `root` by name, excluding names starting
    /// with `.` or `__`. A missing root yields an empty map.
    pub fn scan(&self, root: &Path) -> BTreeMap<String, PathBuf> {
        let mut found = BTreeMap::new();
        let Ok(entries) = std::fs::read_dir(root) else {
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || name.starts_with("__") {
                continue;
            }
            found.insert(name, path);
        }
        found
    }

    /// Parse and validate `<dir>/module.json`. Both the manifest and the
    /// entry script must exist, and the manifest must carry the full
    /// contract shape. Any deviation returns `None` — no partial acceptance.
    pub fn validate(&self, dir: &Path) -> Option<ModuleManifest> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() || !dir.join(ENTRY_SCRIPT).exists() {
            return None;
        }
        let content = std::fs::read_to_string(&manifest_path).ok()?;
        serde_json::from_str::<ModuleManifest>(&content).ok()
    }

    /// Deterministic content hash: SHA-256 over the manifest, entry script,
    /// and dependency declaration, concatenated in that fixed order. Missing
    /// files contribute nothing.
    pub fn content_hash(&self, dir: &Path) -> String {
        let mut hasher = Sha256::new();
        for name in [MANIFEST_FILE, ENTRY_SCRIPT, REQUIREMENTS_FILE] {
            if let Ok(bytes) = std::fs::read(dir.join(name)) {
                hasher.update(&bytes);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}
