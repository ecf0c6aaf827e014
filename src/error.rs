use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure kinds surfaced by the core operations. Per-file copy failures
/// during an install are accumulated in the report instead of raised here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no data root found under {}", .root.display())]
    DataRootNotFound { root: PathBuf },

    #[error("{op} {}: {source}", .path.display())]
    FileSystem {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error("config field `{field}` is not set")]
    ConfigMissing { field: &'static str },

    #[error("parse {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid marker pattern `{pattern}`: {source}")]
    MarkerPattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("invalid snapshot label {label:?}")]
    InvalidLabel { label: String },

    #[error("no snapshot named {label:?} at {}", .path.display())]
    SnapshotMissing { label: String, path: PathBuf },

    #[error("snapshot {label:?} failed integrity check: {detail}")]
    SnapshotIncomplete { label: String, detail: String },

    #[error("could not resolve home directory")]
    HomeDir,
}

impl Error {
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::FileSystem {
            op,
            path: path.into(),
            source,
        }
    }
}
