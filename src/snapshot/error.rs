use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No snapshot available for {channel}/{platform}")]
    Unavailable { channel: String, platform: String },

    #[error("{candidates} index entries match {package} in {channel}/{platform}")]
    Ambiguous {
        package: String,
        channel: String,
        platform: String,
        candidates: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable snapshot found under {0}")]
    NoUsableSnapshots(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),
}
