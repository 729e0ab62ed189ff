use std::path::Path;

/// Error taxonomy of the engine.
///
/// Per-item copy failures are not represented here; they are logged and
/// recorded as skipped items by the orchestrators. Only errors that abort a
/// whole job (or reject it up front) surface as `EngineError`.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("checksum error: {0}")]
    Checksum(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    pub fn archive(context: &str, path: &Path, err: impl std::fmt::Display) -> Self {
        EngineError::Archive(format!("{} {}: {}", context, path.display(), err))
    }
}
