use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input root is not a readable directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("output directory {path} is unusable: {source}")]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cause attached to a single file; never fatal to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileErrorKind {
    Unclassifiable,
    Unreadable,
    ParseDegraded,
    ValidationFailed,
    WriteFailed,
    CacheCorrupt,
    DeadlineExceeded,
    AnalyzerPanicked,
}

impl FileErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileErrorKind::Unclassifiable => "unclassifiable",
            FileErrorKind::Unreadable => "unreadable",
            FileErrorKind::ParseDegraded => "parseDegraded",
            FileErrorKind::ValidationFailed => "validationFailed",
            FileErrorKind::WriteFailed => "writeFailed",
            FileErrorKind::CacheCorrupt => "cacheCorrupt",
            FileErrorKind::DeadlineExceeded => "deadlineExceeded",
            FileErrorKind::AnalyzerPanicked => "analyzerPanicked",
        }
    }
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a file could not be read as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnreadableReason {
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("content is not valid UTF-8 or UTF-16")]
    InvalidEncoding,

    #[error("{0}")]
    Io(String),
}

#[derive(Error, Debug, Clone)]
#[error("{kind}: {detail}")]
pub struct FileError {
    pub kind: FileErrorKind,
    pub detail: String,
}

impl FileError {
    pub fn new(kind: FileErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unreadable(reason: &UnreadableReason) -> Self {
        Self::new(FileErrorKind::Unreadable, reason.to_string())
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry could not be decoded: {0}")]
    Decode(#[from] bincode::Error),

    #[error("entry key mismatch: stored {stored}, requested {requested}")]
    KeyMismatch { stored: String, requested: String },
}

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("failed to open stream {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to stream {stream}: {source}")]
    Write {
        stream: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("stream {0} is already finalized")]
    Finalized(String),

    #[error("{path}:{line}: {reason}")]
    Invalid {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}
