use std::path::PathBuf;

/// Errors returned by the store and the domain service.
///
/// The first group is user-facing (bad input, unknown records, failed session checks) and is
/// never retried. The second group comes from the filesystem or from (de)serialisation; the
/// lock on the affected collection is always released before one of these reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A validation failure attributed to a single request field.
    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthenticated(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to create shard directory {path}: {source}", path = path.display())]
    ShardDirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write shard {key}: {source}")]
    ShardWrite {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to shard key {0:?}: not a safe file name")]
    UnsafeShardKey(String),
    #[error("failed to read collection file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write collection file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to remove collection file: {0}")]
    FileRemove(std::io::Error),
    #[error("failed to serialize collection: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize collection: {0}")]
    Deserialization(serde_json::Error),
    #[error("collection {0} is not a JSON object")]
    NotAnObject(String),
}

impl StoreError {
    pub(crate) fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Field {
            field,
            message: message.into(),
        }
    }

    /// True for errors caused by the request rather than by storage.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::Field { .. }
                | Self::Rejected(_)
                | Self::NotFound(_)
                | Self::Unauthenticated(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
