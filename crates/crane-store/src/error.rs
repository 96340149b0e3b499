use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a record's embedding could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// No embedding column and no feature columns.
    MissingEmbedding { column: String },
    /// A column that should hold numbers holds something else.
    NotNumeric { column: String, data_type: String },
    /// The embedding (or one of its elements) is null.
    Null,
    /// Wrong number of values.
    WrongLength { expected: usize, actual: usize },
}

impl fmt::Display for SchemaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEmbedding { column } => {
                write!(f, "no '{column}' column and no feature columns")
            }
            Self::NotNumeric { column, data_type } => {
                write!(f, "column '{column}' holds {data_type}, not numbers")
            }
            Self::Null => f.write_str("embedding is null or contains nulls"),
            Self::WrongLength { expected, actual } => {
                write!(f, "embedding has {actual} values, expected {expected}")
            }
        }
    }
}

/// One input record whose embedding does not fit the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record '{identifier}': {kind}")]
pub struct SchemaError {
    pub identifier: String,
    pub kind: SchemaErrorKind,
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("input path not found: {0}")]
    NotFound(PathBuf),

    #[error("input file is not a parquet file: {0}")]
    NotParquet(PathBuf),

    #[error("cannot list {path}: {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("arrow error writing {path}: {source}")]
    Arrow {
        path: PathBuf,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("parquet error writing {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("result '{identifier}' has {actual} classes, writer expects {expected}")]
    ClassCount {
        identifier: String,
        expected: usize,
        actual: usize,
    },
}
