use thiserror::Error;

use crate::domain::track::TrackId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("track {0} not found")]
    TrackNotFound(TrackId),

    #[error("playlist {0} not found")]
    PlaylistNotFound(i64),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
