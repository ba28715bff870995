//! Error types for the daemon client

use std::path::PathBuf;
use thiserror::Error;

/// Daemon client error type
#[derive(Error, Debug)]
pub enum Error {
    /// The daemon could not be reached or its API version could not be negotiated
    #[error("failed to connect to daemon at {host}:{port}: {reason}")]
    Connection {
        /// Host the client tried to reach
        host: String,
        /// Port the client tried to reach
        port: u16,
        /// Why negotiation failed
        reason: String,
    },

    /// The daemon answered with a status other than the expected one
    #[error("request {method} {url} failed: {status} - {message}")]
    Request {
        /// HTTP method of the failed request
        method: &'static str,
        /// Full request URL including the query string
        url: String,
        /// Status code returned by the daemon
        status: u16,
        /// Diagnostic text from the response body, if any
        message: String,
    },

    /// The request could not be sent or did not complete within its timeout
    #[error("request {url} could not be completed: {source}")]
    Transport {
        /// Full request URL
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// A request URL could not be formed
    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl {
        /// Base URL the request was built on
        url: String,
        /// Why the URL is invalid
        reason: String,
    },

    /// The response body was not valid JSON for the expected shape
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Full request URL
        url: String,
        /// JSON decoding error
        #[source]
        source: serde_json::Error,
    },

    /// A temporary directory or file operation failed
    #[error("filesystem operation on {} failed: {source}", .path.display())]
    Filesystem {
        /// Path being operated on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A virtual file path would land outside the staging directory
    #[error("file path '{path}' escapes the build context")]
    PathEscape {
        /// Offending relative path
        path: String,
    },

    /// The expected published port binding is absent
    #[error("container '{container}' has no usable binding for {port}: {reason}")]
    PortBinding {
        /// Container name that was inspected
        container: String,
        /// Container port key, e.g. `3000/tcp`
        port: String,
        /// What was missing or malformed
        reason: String,
    },

    /// Packaging the staged directory into a tar archive failed
    #[error("failed to package build context into {}: {source}", .path.display())]
    Archive {
        /// Archive output path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The build progress stream could not be read to completion
    #[error("build stream from {url} was interrupted: {source}")]
    BuildStream {
        /// Build request URL
        url: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The daemon reported a failure inside the build progress stream
    #[error("image build for tag {tag} failed: {message}")]
    BuildFailed {
        /// Tag the build was submitted under
        tag: String,
        /// Error message reported by the daemon
        message: String,
    },

    /// JSON encoding of labels or filters failed
    #[error("JSON encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// YAML configuration parsing error
    #[error("YAML configuration error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a filesystem error for the given path
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Create a connection error
    pub fn connection(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::Connection {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// HTTP status carried by a [`Error::Request`], if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
