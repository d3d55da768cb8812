use modrun_domain::AssetStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("source file does not exist: {0}")]
    SourceMissing(String),

    #[error("asset {asset} is terminal ({status}) and cannot be mutated")]
    TerminalState { asset: String, status: AssetStatus },

    #[error("store error: {0}")]
    Store(#[from] modrun_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
