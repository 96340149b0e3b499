//! CSV result output, plus a small Parquet writer for producing test inputs.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray};
use arrow::csv::{Writer, WriterBuilder};
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use crane_core::ScoreResult;
use crane_core::schema::result_schema;
#[cfg(any(test, feature = "test-util"))]
use parquet::arrow::ArrowWriter;
use tracing::debug;

use crate::WriteError;

/// Streams [`ScoreResult`]s to a CSV file.
///
/// The header is written on creation, so a run with zero records still
/// leaves a valid file behind.
pub struct ResultWriter {
    path: PathBuf,
    schema: SchemaRef,
    classes: usize,
    csv: Writer<BufWriter<File>>,
    rows: usize,
}

impl ResultWriter {
    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: &Path, classes: &[String]) -> Result<Self, WriteError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let schema = result_schema(classes);
        let mut csv = WriterBuilder::new()
            .with_header(true)
            .build(BufWriter::new(file));
        csv.write(&RecordBatch::new_empty(schema.clone()))
            .map_err(|source| WriteError::Arrow {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(path = %path.display(), classes = classes.len(), "created result file");
        Ok(Self {
            path: path.to_path_buf(),
            schema,
            classes: classes.len(),
            csv,
            rows: 0,
        })
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Append one row per result, in order.
    pub fn write_batch(&mut self, results: &[ScoreResult]) -> Result<(), WriteError> {
        if results.is_empty() {
            return Ok(());
        }
        if let Some(bad) = results
            .iter()
            .find(|r| r.scores.len() != self.classes || r.decisions.len() != self.classes)
        {
            return Err(WriteError::ClassCount {
                identifier: bad.identifier.clone(),
                expected: self.classes,
                actual: bad.scores.len(),
            });
        }

        let batch = self.to_batch(results).map_err(|source| WriteError::Arrow {
            path: self.path.clone(),
            source,
        })?;
        self.csv.write(&batch).map_err(|source| WriteError::Arrow {
            path: self.path.clone(),
            source,
        })?;
        self.rows += results.len();
        Ok(())
    }

    /// Flush and close the file. Returns the number of data rows written.
    pub fn finish(self) -> Result<usize, WriteError> {
        let mut inner = self.csv.into_inner();
        inner.flush().map_err(|source| WriteError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), rows = self.rows, "closed result file");
        Ok(self.rows)
    }

    fn to_batch(&self, results: &[ScoreResult]) -> Result<RecordBatch, ArrowError> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(1 + 2 * self.classes);
        columns.push(Arc::new(StringArray::from_iter_values(
            results.iter().map(|r| r.identifier.as_str()),
        )));
        for class in 0..self.classes {
            columns.push(Arc::new(Float64Array::from_iter_values(
                results.iter().map(|r| r.scores[class]),
            )));
            columns.push(Arc::new(
                results
                    .iter()
                    .map(|r| r.decisions[class])
                    .collect::<BooleanArray>(),
            ));
        }
        RecordBatch::try_new(self.schema.clone(), columns)
    }
}

/// Write record batches to a Parquet file, creating parent directories.
///
/// Builds input fixtures for tests; enabled by the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
pub fn write_parquet(
    path: &Path,
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<(), WriteError> {
    let parquet_err = |source| WriteError::Parquet {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = ArrowWriter::try_new(file, schema, None).map_err(parquet_err)?;
    for batch in batches {
        writer.write(batch).map_err(parquet_err)?;
    }
    writer.close().map_err(parquet_err)?;
    Ok(())
}
