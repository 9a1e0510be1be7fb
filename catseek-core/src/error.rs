//! Error types shared by the engine, the container codec and the exporters.

use thiserror::Error;

use crate::model::Mode;

/// Problems with the metadata or tensor sets handed to the container writer.
///
/// These are detected before a single byte reaches the destination.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("metadata set is empty")]
    NoMetadata,

    #[error("tensor set is empty")]
    NoTensors,

    #[error("metadata entry {index} has an empty key")]
    EmptyKey { index: usize },

    #[error("duplicate metadata key `{0}`")]
    DuplicateKey(String),

    #[error("tensor {index} has an empty name")]
    EmptyTensorName { index: usize },

    #[error("duplicate tensor name `{0}`")]
    DuplicateTensorName(String),

    #[error("tensor `{tensor}` holds {value} at index {index}; only +1 and -1 are allowed")]
    NotASign { tensor: String, index: usize, value: i8 },
}

/// Problems found while parsing a container back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad container tag {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("unexpected end of data at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("metadata `{key}` has unknown value type tag {tag}")]
    UnknownValueType { key: String, tag: u32 },

    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{0} trailing bytes after the last tensor")]
    TrailingBytes(usize),

    #[error("no element count known for tensor `{0}`")]
    UnknownTensorLength(String),

    #[error("length {0} does not fit in memory")]
    LengthOverflow(u64),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("malformed container: {0}")]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("history store error: {0}")]
    History(#[from] rusqlite::Error),

    #[error("response pool for {0} mode is empty")]
    EmptyResponsePool(Mode),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
