use crate::gcp::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The path does not exist. Never worth retrying.
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP {status} for `{path}`: {message}")]
    Http {
        path: String,
        status: u16,
        message: String,
    },

    #[error("Object store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl StoreError {
    pub fn io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_string())
        } else {
            StoreError::Io {
                path: path.to_string(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            StoreError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
