use std::path::PathBuf;

use thiserror::Error;

use crate::codec::Dtype;

/// Malformed packed-array text.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded {actual} bytes, expected {expected} for a {rows}x{cols} {dtype} array")]
    Length {
        actual: usize,
        expected: usize,
        rows: usize,
        cols: usize,
        dtype: Dtype,
    },

    #[error("{bytes} bytes is not a whole number of {dtype} elements")]
    Ragged { bytes: usize, dtype: Dtype },

    #[error("shape {rows}x{cols} has a zero dimension")]
    EmptyShape { rows: usize, cols: usize },
}

/// Model configuration that cannot be turned into a valid classifier.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("cannot decode '{field}': {source}")]
    Codec {
        field: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
