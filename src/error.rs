use std::io;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type DfsResult<T> = Result<T, Error>;

/// Enum for client errors
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint could not be resolved into a usable store
    #[error("cannot connect to {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    /// A store request was rejected or failed half-way
    #[error("{op} {path}")]
    Operation {
        op: &'static str,
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The store does not declare the capability needed by the request
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Malformed framed text record
    #[error("bad record: {0}")]
    Framing(String),
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn connection<E: Into<BoxError>>(endpoint: impl ToString, source: E) -> Self {
        Self::Connection {
            endpoint: endpoint.to_string(),
            source: source.into(),
        }
    }

    pub fn operation<E: Into<BoxError>>(op: &'static str, path: impl ToString, source: E) -> Self {
        Self::Operation {
            op,
            path: path.to_string(),
            source: source.into(),
        }
    }

    /// Returns `true` when the failure means the path does not exist, wherever
    /// in the chain the missing path was reported.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            Self::Operation { source, .. } | Self::Connection { source, .. } => {
                if let Some(inner) = source.downcast_ref::<Error>() {
                    inner.is_not_found()
                } else {
                    source
                        .downcast_ref::<io::Error>()
                        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
                }
            }
            _ => false,
        }
    }
}
