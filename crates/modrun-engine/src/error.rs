use thiserror::Error;

/// Task submission rejections. Validation variants name the offending key or
/// asset and occur before any side effect; `Store`/`Asset` wrap real faults.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("missing required input: {key}")]
    MissingInput { key: String },

    #[error("input asset {asset} for key '{key}' not found")]
    AssetNotFound { key: String, asset: String },

    #[error("input asset {asset} for key '{key}' is FAILED")]
    AssetFailed { key: String, asset: String },

    #[error("asset {asset} media type '{media_type}' not allowed for key '{key}', expected one of {allowed:?}")]
    MediaTypeRejected {
        key: String,
        asset: String,
        media_type: String,
        allowed: Vec<String>,
    },

    #[error("store error: {0}")]
    Store(#[from] modrun_store::StoreError),

    #[error("asset error: {0}")]
    Asset(#[from] modrun_assets::AssetError),
}

impl SubmitError {
    /// Whether this is a caller mistake (as opposed to an internal fault).
    pub fn is_validation(&self) -> bool {
        !matches!(self, SubmitError::Store(_) | SubmitError::Asset(_))
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] modrun_store::StoreError),

    #[error("asset error: {0}")]
    Asset(#[from] modrun_assets::AssetError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
