use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`], used by callers that only care about
/// the category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidKey,
    InvalidName,
    DuplicateName,
    NotFound,
    OutOfRange,
    UnsupportedMethod,
    Transport,
    Persistence,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("invalid key: variable keys must not be empty")]
    InvalidKey,

    #[error("invalid profile name '{0}': must be lower case and each character must be within a-z or a digit")]
    InvalidName(String),

    #[error("profile '{0}' already exists")]
    DuplicateName(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("history index {index} is out of range (history size is {size})")]
    OutOfRange { index: usize, size: usize },

    #[error("unsupported method '{0}' (expected GET, POST, PUT, DELETE or HEAD)")]
    UnsupportedMethod(String),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: corrupt profile data: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::InvalidKey => ErrorKind::InvalidKey,
            Error::InvalidName(_) => ErrorKind::InvalidName,
            Error::DuplicateName(_) => ErrorKind::DuplicateName,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::OutOfRange { .. } => ErrorKind::OutOfRange,
            Error::UnsupportedMethod(_) => ErrorKind::UnsupportedMethod,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Io { .. } | Error::Corrupt { .. } => ErrorKind::Persistence,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Corrupt {
            path: path.into(),
            source,
        }
    }
}
