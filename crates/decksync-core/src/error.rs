//! Error types for decksync-core

use thiserror::Error;

/// Result type alias using decksync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in decksync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input rejected before it reached the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found, locally or remotely
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Remote API failure, carrying the upstream message
    #[error("Remote API error: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// A remote call did not finish within its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Another sync run holds the engine
    #[error("Sync already in progress")]
    SyncInProgress,

    /// The sync run was cancelled between entities
    #[error("Sync cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Applying a conflict resolution failed; the conflict stays unresolved
    #[error("Conflict resolution failed: {0}")]
    Resolution(Box<crate::models::SyncError>),
}

impl Error {
    pub(crate) fn deck_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Deck",
            id: id.to_string(),
        }
    }

    pub(crate) fn card_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Card",
            id: id.to_string(),
        }
    }

    /// Whether this error means the target entity does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout(error.to_string());
        }
        Self::Remote {
            status: error.status().map(|status| status.as_u16()),
            message: error.to_string(),
        }
    }
}
