use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DiagError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported retention period: {0} days")]
    InvalidRetention(u32),
}

pub type Result<T, E = DiagError> = std::result::Result<T, E>;
