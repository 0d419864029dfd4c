use serde::{ser::Serializer, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/**
 * Create the error type that represents all errors possible in the library.
 * A path that does not resolve is never one of them: lookups return `None`.
 */
#[derive(Debug, Error)]
pub enum CloudFsError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("Local I/O error on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote call '{operation}' failed: {source}")]
    RemoteCall {
        operation: &'static str,
        #[source]
        source: Box<CloudFsError>,
    },

    #[error("Transfer of {path} failed: {reason}")]
    Transfer { path: PathBuf, reason: String },

    #[error("Destination already exists: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path error: {0}")]
    Path(String),

    #[error("An error occurred while reading the config: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Remote store error: {0}")]
    Store(String),

    #[error("Dropbox SDK error: {0}")]
    DropboxSdk(String),

    #[error("Dropbox error: {0}")]
    Dropbox(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl CloudFsError {
    /**
     * Attach the name of the remote operation that produced this error
     */
    pub fn during(self, operation: &'static str) -> Self {
        CloudFsError::RemoteCall {
            operation,
            source: Box::new(self),
        }
    }

    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CloudFsError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /**
     * Name of the remote operation, if this is an annotated remote failure
     */
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            CloudFsError::RemoteCall { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/**
 * Serialize errors as their message
 */
impl Serialize for CloudFsError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type AnyResult<T, E = CloudFsError> = Result<T, E>;

impl<T: std::fmt::Debug> From<dropbox_sdk::Error<T>> for CloudFsError {
    fn from(error: dropbox_sdk::Error<T>) -> Self {
        CloudFsError::DropboxSdk(format!("{:?}", error))
    }
}

impl From<toml::de::Error> for CloudFsError {
    fn from(error: toml::de::Error) -> Self {
        CloudFsError::Config(error.to_string())
    }
}

impl From<ring::error::Unspecified> for CloudFsError {
    fn from(_: ring::error::Unspecified) -> Self {
        CloudFsError::Crypto("authentication or key setup failed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    fn during_keeps_the_cause() {
        let err = CloudFsError::Store("quota exceeded".to_string()).during("list");
        assert_eq!(err.operation(), Some("list"));
        assert_eq!(
            err.to_string(),
            "Remote call 'list' failed: Remote store error: quota exceeded"
        );
    }

    #[rstest]
    fn serializes_as_message() {
        let err = CloudFsError::Conflict("/a/b".to_string());
        assert_eq!(serde_json::to_string(&err).unwrap(), "\"Destination already exists: /a/b\"");
    }
}
