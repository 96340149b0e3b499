//! Storage layer: Parquet embedding input, CSV result output.

mod error;
pub mod reader;
pub mod writer;

pub use error::{ReadError, SchemaError, SchemaErrorKind, WriteError};
pub use reader::{EmbeddingReader, ReaderOptions, discover, input_root};
pub use writer::ResultWriter;
#[cfg(any(test, feature = "test-util"))]
pub use writer::write_parquet;
