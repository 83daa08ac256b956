use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] decksync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{entity} ID cannot be empty")]
    EmptyId { entity: &'static str },
    #[error("{entity} not found for id/prefix: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Nothing to change; pass at least one field flag")]
    EmptyPatch,
    #[error("Sync finished with {0} error(s)")]
    SyncFailed(usize),
    #[error(
        "Sync is not configured. Set DECKSYNC_API_URL (or pass --api-url) to the deck service base URL."
    )]
    SyncNotConfigured,
}
