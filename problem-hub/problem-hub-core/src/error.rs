use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("access denied")]
    AccessDenied,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("unknown access level `{0}`")]
    UnknownAccessLevel(String),

    #[error("authentication failed")]
    Unauthorized,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl HubError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        HubError::NotFound(what.to_string())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HubError::Io {
            path: path.into(),
            source,
        }
    }

    /// Missing or empty required input field.
    pub fn missing(field: &str) -> Self {
        HubError::Validation(format!("missing required field `{field}`"))
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
