use std::io;

use thiserror::Error;

use crate::plug::Method;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Every WebHDFS operation URL lives under this root.
pub const API_ROOT: &str = "/webhdfs/v1";

/// Default chunk size for transfers and ranged reads (1 MiB).
pub const TRUNK_SIZE: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum HdfsError {
    /// The server answered with a status other than the one the operation expects.
    #[error("Failed to handle url {url} with method {method}, status: {status}, msg: {message}")]
    Protocol {
        method: Method,
        url: String,
        status: u16,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid seek to negative position {0}")]
    InvalidSeek(i64),

    /// A chunked upload stopped after `committed` bytes were appended.
    #[error("Upload interrupted after {committed} bytes: {source}")]
    PartialUpload {
        committed: u64,
        #[source]
        source: Box<HdfsError>,
    },
}

impl HdfsError {
    /// HTTP status carried by a protocol failure, looking through partial uploads.
    pub fn status(&self) -> Option<u16> {
        match self {
            HdfsError::Protocol { status, .. } => Some(*status),
            HdfsError::PartialUpload { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Undo the wrapping done when an `HdfsError` crossed a `Read` boundary.
    pub(crate) fn from_io(err: io::Error) -> Self {
        err.downcast::<HdfsError>().unwrap_or_else(HdfsError::Io)
    }
}

pub type Result<T> = std::result::Result<T, HdfsError>;

impl From<HdfsError> for io::Error {
    fn from(err: HdfsError) -> Self {
        match err {
            HdfsError::Io(e) => e,
            HdfsError::Unsupported(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            HdfsError::InvalidSeek(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            other => io::Error::other(other),
        }
    }
}
