use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Duplicate source URL: {0}")]
    DuplicateUrl(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Media deletion failed for {video_id}: {reason}")]
    MediaDeletionFailed { video_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
