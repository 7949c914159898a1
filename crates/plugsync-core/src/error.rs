use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error("extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("phase {0} not found")]
    PhaseNotFound(u32),

    #[error("topic already exists: {0}")]
    TopicExists(String),

    #[error("no topics provided")]
    NoTopics,

    #[error("batch mode requires 2+ topics")]
    BatchTooSmall,

    #[error("no phases found after migration")]
    NoPhases,

    #[error("invalid category '{0}': must be one of friction, success, confusion, observation, debt, tooling")]
    InvalidCategory(String),

    #[error("text is required")]
    EmptyText,

    #[error("invalid queue entry: {0}")]
    InvalidQueueEntry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
