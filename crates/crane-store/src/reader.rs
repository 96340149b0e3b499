//! Lazy embedding reader over Parquet files.
//!
//! Files are opened one at a time and pulled one record batch at a time, so
//! inputs larger than memory stream through. Two layouts are understood:
//!
//! - **list**: a single `List` / `LargeList` / `FixedSizeList` column of
//!   numbers (default name `embedding`);
//! - **wide**: one numeric column per feature, every column that is not an
//!   identifier column, in schema order.
//!
//! Rows that do not fit the model's dimensionality come out as
//! [`SchemaError`]s; the stream keeps going.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use crane_core::EmbeddingRecord;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use tracing::debug;

use crate::{ReadError, SchemaError, SchemaErrorKind};

pub const DEFAULT_EMBEDDING_COLUMN: &str = "embedding";
pub const DEFAULT_ID_COLUMNS: &[&str] = &["source", "offset", "channel"];
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// How to find embeddings and identifiers in an input file.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Expected embedding length (the model's D).
    pub dim: usize,
    /// Rows decoded per Parquet read.
    pub batch_size: usize,
    pub embedding_column: String,
    /// Columns joined with `:` to form a record identifier.
    pub id_columns: Vec<String>,
}

impl ReaderOptions {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            batch_size: DEFAULT_BATCH_SIZE,
            embedding_column: DEFAULT_EMBEDDING_COLUMN.to_string(),
            id_columns: DEFAULT_ID_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// List the Parquet files under `source`.
///
/// A file is returned as-is; a directory is walked recursively and its
/// `*.parquet` files returned in sorted path order.
pub fn discover(source: &Path) -> Result<Vec<PathBuf>, ReadError> {
    if source.is_file() {
        if !is_parquet(source) {
            return Err(ReadError::NotParquet(source.to_path_buf()));
        }
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Err(ReadError::NotFound(source.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(source, &mut files)?;
    files.sort();
    Ok(files)
}

/// Directory that identifiers and mirrored output paths are relative to.
pub fn input_root(source: &Path) -> PathBuf {
    if source.is_file() {
        source.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        source.to_path_buf()
    }
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ReadError::Discover {
        path: dir.to_path_buf(),
        source,
    })?;
    let discover_err = |source| ReadError::Discover {
        path: dir.to_path_buf(),
        source,
    };
    for entry in entries {
        let entry = entry.map_err(discover_err)?;
        // Symlinked directories are not followed, so link cycles cannot recurse.
        let file_type = entry.file_type().map_err(discover_err)?;
        let path = entry.path();
        if file_type.is_dir() {
            walk(&path, files)?;
        } else if is_parquet(&path) && path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn is_parquet(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "parquet")
}

/// Finite, single-pass stream of embedding records across a list of files.
///
/// At most one file is open at a time. It is closed as soon as it is
/// exhausted, fails, or the reader is dropped.
pub struct EmbeddingReader {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
    options: ReaderOptions,
    current: Option<OpenFile>,
    pending: VecDeque<Result<EmbeddingRecord, ReadError>>,
}

impl EmbeddingReader {
    /// Discover the files under `source` and stream them in order.
    pub fn open(source: &Path, options: ReaderOptions) -> Result<Self, ReadError> {
        let files = discover(source)?;
        Ok(Self::from_files(input_root(source), files, options))
    }

    /// Stream an explicit list of files. Identifiers use paths relative to `root`.
    pub fn from_files(root: PathBuf, files: Vec<PathBuf>, options: ReaderOptions) -> Self {
        Self {
            root,
            files: files.into_iter(),
            options,
            current: None,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for EmbeddingReader {
    type Item = Result<EmbeddingRecord, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }

            let file = match self.current.as_mut() {
                Some(file) => file,
                None => {
                    let path = self.files.next()?;
                    match open_file(path, &self.root, &self.options) {
                        Ok(file) => self.current = Some(file),
                        Err(err) => return Some(Err(err)),
                    }
                    continue;
                }
            };

            match file.batches.next() {
                None => {
                    debug!(file = %file.name, rows = file.next_row, "finished input file");
                    self.current = None;
                }
                Some(Ok(batch)) => {
                    let decoded = decode_batch(file, &batch, self.options.dim, &mut self.pending);
                    file.next_row += batch.num_rows();
                    if let Err(err) = decoded {
                        let path = file.path.clone();
                        self.current = None;
                        return Some(Err(ReadError::Unreadable {
                            path,
                            reason: err.to_string(),
                        }));
                    }
                }
                Some(Err(err)) => {
                    let path = file.path.clone();
                    self.current = None;
                    return Some(Err(ReadError::Unreadable {
                        path,
                        reason: err.to_string(),
                    }));
                }
            }
        }
    }
}

struct OpenFile {
    path: PathBuf,
    /// Path relative to the input root, used in fallback identifiers.
    name: String,
    batches: ParquetRecordBatchReader,
    layout: Layout,
    id_columns: Vec<usize>,
    next_row: usize,
}

enum Layout {
    List { index: usize, name: String },
    Wide(Vec<usize>),
    /// The file cannot yield embeddings; every row is a schema error.
    Invalid(SchemaErrorKind),
}

fn open_file(path: PathBuf, root: &Path, options: &ReaderOptions) -> Result<OpenFile, ReadError> {
    let unreadable = |reason: String| ReadError::Unreadable {
        path: path.clone(),
        reason,
    };

    let file = File::open(&path).map_err(|e| unreadable(e.to_string()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| unreadable(e.to_string()))?;
    let schema = builder.schema().clone();
    let batches = builder
        .with_batch_size(options.batch_size.max(1))
        .build()
        .map_err(|e| unreadable(e.to_string()))?;

    let layout = resolve_layout(&schema, options);
    let id_columns = options
        .id_columns
        .iter()
        .filter_map(|name| schema.index_of(name).ok())
        .collect();
    let name = path
        .strip_prefix(root)
        .unwrap_or(&path)
        .display()
        .to_string();

    debug!(file = %name, columns = schema.fields().len(), "opened input file");
    Ok(OpenFile {
        path,
        name,
        batches,
        layout,
        id_columns,
        next_row: 0,
    })
}

fn resolve_layout(schema: &Schema, options: &ReaderOptions) -> Layout {
    if let Ok(index) = schema.index_of(&options.embedding_column) {
        let field = schema.field(index);
        return match field.data_type() {
            DataType::List(item) | DataType::LargeList(item) | DataType::FixedSizeList(item, _)
                if is_number(item.data_type()) =>
            {
                Layout::List {
                    index,
                    name: field.name().clone(),
                }
            }
            other => Layout::Invalid(SchemaErrorKind::NotNumeric {
                column: field.name().clone(),
                data_type: other.to_string(),
            }),
        };
    }

    let mut features = Vec::new();
    for (index, field) in schema.fields().iter().enumerate() {
        if options.id_columns.iter().any(|c| c == field.name()) {
            continue;
        }
        if !is_number(field.data_type()) {
            return Layout::Invalid(SchemaErrorKind::NotNumeric {
                column: field.name().clone(),
                data_type: field.data_type().to_string(),
            });
        }
        features.push(index);
    }

    if features.is_empty() {
        Layout::Invalid(SchemaErrorKind::MissingEmbedding {
            column: options.embedding_column.clone(),
        })
    } else {
        Layout::Wide(features)
    }
}

fn is_number(data_type: &DataType) -> bool {
    data_type.is_floating() || data_type.is_integer()
}

fn decode_batch(
    file: &OpenFile,
    batch: &RecordBatch,
    dim: usize,
    out: &mut VecDeque<Result<EmbeddingRecord, ReadError>>,
) -> Result<(), ArrowError> {
    let ids = identifiers(file, batch)?;

    match &file.layout {
        Layout::Invalid(kind) => {
            for id in ids {
                out.push_back(to_record(id, Err(kind.clone())));
            }
        }
        Layout::List { index, name } => {
            let column = batch.column(*index);
            for (row, id) in ids.into_iter().enumerate() {
                out.push_back(to_record(id, list_row(column, name, row, dim)));
            }
        }
        Layout::Wide(indices) => {
            let casted = indices
                .iter()
                .map(|&i| cast(batch.column(i), &DataType::Float64))
                .collect::<Result<Vec<ArrayRef>, _>>()?;
            let columns: Vec<_> = casted
                .iter()
                .map(|c| c.as_primitive::<Float64Type>())
                .collect();

            for (row, id) in ids.into_iter().enumerate() {
                let vector = if columns.len() != dim {
                    Err(SchemaErrorKind::WrongLength {
                        expected: dim,
                        actual: columns.len(),
                    })
                } else if columns.iter().any(|c| c.is_null(row)) {
                    Err(SchemaErrorKind::Null)
                } else {
                    Ok(columns.iter().map(|c| c.value(row)).collect())
                };
                out.push_back(to_record(id, vector));
            }
        }
    }
    Ok(())
}

fn to_record(
    identifier: String,
    vector: Result<Vec<f64>, SchemaErrorKind>,
) -> Result<EmbeddingRecord, ReadError> {
    match vector {
        Ok(vector) => Ok(EmbeddingRecord::new(identifier, vector)),
        Err(kind) => Err(SchemaError { identifier, kind }.into()),
    }
}

fn list_row(
    column: &ArrayRef,
    name: &str,
    row: usize,
    dim: usize,
) -> Result<Vec<f64>, SchemaErrorKind> {
    if column.is_null(row) {
        return Err(SchemaErrorKind::Null);
    }

    let values: ArrayRef = if let Some(list) = column.as_list_opt::<i32>() {
        list.value(row)
    } else if let Some(list) = column.as_list_opt::<i64>() {
        list.value(row)
    } else if let Some(list) = column.as_fixed_size_list_opt() {
        list.value(row)
    } else {
        return Err(SchemaErrorKind::NotNumeric {
            column: name.to_string(),
            data_type: column.data_type().to_string(),
        });
    };

    if values.len() != dim {
        return Err(SchemaErrorKind::WrongLength {
            expected: dim,
            actual: values.len(),
        });
    }
    if values.null_count() > 0 {
        return Err(SchemaErrorKind::Null);
    }

    let values = cast(&values, &DataType::Float64).map_err(|e| SchemaErrorKind::NotNumeric {
        column: name.to_string(),
        data_type: e.to_string(),
    })?;
    Ok(values.as_primitive::<Float64Type>().values().to_vec())
}

/// One identifier per row: the identifier columns joined with `:`, or
/// `<file>#<row>` when the file has none of them.
fn identifiers(file: &OpenFile, batch: &RecordBatch) -> Result<Vec<String>, ArrowError> {
    let rows = 0..batch.num_rows();
    if file.id_columns.is_empty() {
        return Ok(rows
            .map(|row| format!("{}#{}", file.name, file.next_row + row))
            .collect());
    }

    let options = FormatOptions::default();
    let formatters = file
        .id_columns
        .iter()
        .map(|&i| ArrayFormatter::try_new(batch.column(i).as_ref(), &options))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .map(|row| {
            formatters
                .iter()
                .map(|f| f.value(row).to_string())
                .collect::<Vec<_>>()
                .join(":")
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_parquet;
    use arrow::array::{
        FixedSizeListBuilder, Float32Array, Float32Builder, Int32Array, ListBuilder, StringArray,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    fn list_batch(rows: &[(&str, i32, Option<&[f32]>)]) -> RecordBatch {
        let mut emb = ListBuilder::new(Float32Builder::new());
        for (_, _, v) in rows {
            match v {
                Some(values) => {
                    for &x in *values {
                        emb.values().append_value(x);
                    }
                    emb.append(true);
                }
                None => emb.append(false),
            }
        }
        RecordBatch::try_from_iter(vec![
            (
                "source",
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))) as ArrayRef,
            ),
            (
                "offset",
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.1))) as ArrayRef,
            ),
            ("embedding", Arc::new(emb.finish()) as ArrayRef),
        ])
        .unwrap()
    }

    /// `source`, `offset`, `channel`, then one Float32 column per feature.
    fn wide_batch(rows: &[(&str, i32, i32, Vec<f32>)]) -> RecordBatch {
        let n_features = rows.first().map(|r| r.3.len()).unwrap_or(0);
        let mut columns: Vec<(String, ArrayRef)> = vec![
            (
                "source".into(),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.0))) as ArrayRef,
            ),
            (
                "offset".into(),
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.1))) as ArrayRef,
            ),
            (
                "channel".into(),
                Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.2))) as ArrayRef,
            ),
        ];
        for f in 0..n_features {
            columns.push((
                format!("feature_{f}"),
                Arc::new(Float32Array::from_iter_values(rows.iter().map(|r| r.3[f]))) as ArrayRef,
            ));
        }
        RecordBatch::try_from_iter(columns).unwrap()
    }

    fn write(path: &Path, batch: &RecordBatch) {
        write_parquet(path, batch.schema(), std::slice::from_ref(batch)).unwrap();
    }

    fn read_all(source: &Path, options: ReaderOptions) -> Vec<Result<EmbeddingRecord, ReadError>> {
        EmbeddingReader::open(source, options).unwrap().collect()
    }

    #[test]
    fn reads_list_layout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.parquet");
        write(
            &path,
            &list_batch(&[
                ("rec/1.wav", 0, Some(&[1.0, 0.0, 0.5])),
                ("rec/1.wav", 5, Some(&[0.25, 2.0, -1.0])),
            ]),
        );

        let records: Vec<EmbeddingRecord> = read_all(&path, ReaderOptions::new(3))
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "rec/1.wav:0");
        assert_eq!(records[0].vector, vec![1.0, 0.0, 0.5]);
        assert_eq!(records[1].identifier, "rec/1.wav:5");
        assert_eq!(records[1].vector, vec![0.25, 2.0, -1.0]);
    }

    #[test]
    fn reads_fixed_size_list_layout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fsl.parquet");
        let mut emb = FixedSizeListBuilder::new(Float32Builder::new(), 2);
        for v in [[1.0f32, 2.0], [3.0, 4.0]] {
            for x in v {
                emb.values().append_value(x);
            }
            emb.append(true);
        }
        let batch = RecordBatch::try_from_iter(vec![("embedding", Arc::new(emb.finish()) as ArrayRef)])
            .unwrap();
        write(&path, &batch);

        let records: Vec<EmbeddingRecord> = read_all(&path, ReaderOptions::new(2))
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records[1].vector, vec![3.0, 4.0]);
        // No identifier columns: file name and row index.
        assert_eq!(records[0].identifier, "fsl.parquet#0");
        assert_eq!(records[1].identifier, "fsl.parquet#1");
    }

    #[test]
    fn reads_wide_layout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wide.parquet");
        write(
            &path,
            &wide_batch(&[
                ("https://example.com/path/1", 17, 1, vec![0.5, 1.5, -2.0, 0.1]),
                ("https://example.com/path/1", 3, 2, vec![1.0, 1.0, 1.0, 1.0]),
            ]),
        );

        let records: Vec<EmbeddingRecord> = read_all(&path, ReaderOptions::new(4))
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(records[0].identifier, "https://example.com/path/1:17:1");
        assert_eq!(records[1].identifier, "https://example.com/path/1:3:2");
        assert_eq!(records[0].vector, vec![0.5, 1.5, -2.0, f64::from(0.1f32)]);
    }

    #[test]
    fn wrong_length_is_a_per_record_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.parquet");
        write(
            &path,
            &list_batch(&[
                ("s", 0, Some(&[1.0, 0.0, 0.0])),
                ("s", 1, Some(&[1.0, 0.0])),
                ("s", 2, Some(&[0.0, 1.0, 0.0])),
            ]),
        );

        let items = read_all(&path, ReaderOptions::new(3));
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(ReadError::Schema(err)) => {
                assert_eq!(err.identifier, "s:1");
                assert_eq!(
                    err.kind,
                    SchemaErrorKind::WrongLength {
                        expected: 3,
                        actual: 2
                    }
                );
            }
            other => panic!("expected schema error, got {other:?}"),
        }
        assert_eq!(items[2].as_ref().unwrap().identifier, "s:2");
    }

    #[test]
    fn null_embedding_is_a_per_record_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.parquet");
        write(
            &path,
            &list_batch(&[("s", 0, None), ("s", 1, Some(&[1.0]))]),
        );

        let items = read_all(&path, ReaderOptions::new(1));
        assert!(matches!(
            &items[0],
            Err(ReadError::Schema(SchemaError {
                kind: SchemaErrorKind::Null,
                ..
            }))
        ));
        assert!(items[1].is_ok());
    }

    #[test]
    fn wide_layout_with_wrong_feature_count() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wide.parquet");
        write(&path, &wide_batch(&[("s", 0, 1, vec![1.0, 2.0])]));

        let items = read_all(&path, ReaderOptions::new(3));
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Err(ReadError::Schema(SchemaError {
                kind: SchemaErrorKind::WrongLength {
                    expected: 3,
                    actual: 2
                },
                ..
            }))
        ));
    }

    #[test]
    fn non_numeric_feature_column() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.parquet");
        let batch = RecordBatch::try_from_iter(vec![
            ("source", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
            ("label", Arc::new(StringArray::from(vec!["x", "y"])) as ArrayRef),
            ("feature_0", Arc::new(Float32Array::from(vec![1.0, 2.0])) as ArrayRef),
        ])
        .unwrap();
        write(&path, &batch);

        let items = read_all(&path, ReaderOptions::new(1));
        assert_eq!(items.len(), 2, "one error per row");
        for item in &items {
            match item {
                Err(ReadError::Schema(SchemaError {
                    kind: SchemaErrorKind::NotNumeric { column, .. },
                    ..
                })) => assert_eq!(column, "label"),
                other => panic!("expected schema error, got {other:?}"),
            }
        }
    }

    #[test]
    fn embedding_column_of_strings() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.parquet");
        let batch = RecordBatch::try_from_iter(vec![(
            "embedding",
            Arc::new(StringArray::from(vec!["1,2,3"])) as ArrayRef,
        )])
        .unwrap();
        write(&path, &batch);

        let items = read_all(&path, ReaderOptions::new(3));
        assert!(matches!(
            &items[0],
            Err(ReadError::Schema(SchemaError {
                kind: SchemaErrorKind::NotNumeric { .. },
                ..
            }))
        ));
    }

    #[test]
    fn custom_columns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.parquet");
        let mut emb = ListBuilder::new(Float32Builder::new());
        emb.values().append_value(4.0);
        emb.append(true);
        let batch = RecordBatch::try_from_iter(vec![
            ("clip_id", Arc::new(Int32Array::from(vec![42])) as ArrayRef),
            ("vec", Arc::new(emb.finish()) as ArrayRef),
        ])
        .unwrap();
        write(&path, &batch);

        let mut options = ReaderOptions::new(1);
        options.embedding_column = "vec".into();
        options.id_columns = vec!["clip_id".into()];
        let records: Vec<_> = read_all(&path, options)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records[0].identifier, "42");
        assert_eq!(records[0].vector, vec![4.0]);
    }

    #[test]
    fn row_indices_continue_across_batches() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("many.parquet");
        let values: Vec<f32> = (0..5).map(|i| i as f32).collect();
        let batch = RecordBatch::try_from_iter(vec![(
            "feature_0",
            Arc::new(Float32Array::from(values)) as ArrayRef,
        )])
        .unwrap();
        write(&path, &batch);

        let mut options = ReaderOptions::new(1);
        options.batch_size = 2;
        let records: Vec<_> = read_all(&path, options)
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let ids: Vec<&str> = records.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "many.parquet#0",
                "many.parquet#1",
                "many.parquet#2",
                "many.parquet#3",
                "many.parquet#4"
            ]
        );
        assert_eq!(records[4].vector, vec![4.0]);
    }

    #[test]
    fn directory_is_walked_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("subdir1")).unwrap();
        write(&root.join("b.parquet"), &list_batch(&[("b", 0, Some(&[2.0]))]));
        write(&root.join("a.parquet"), &list_batch(&[("a", 0, Some(&[1.0]))]));
        write(
            &root.join("subdir1").join("c.parquet"),
            &list_batch(&[("c", 0, Some(&[3.0])), ("c", 1, Some(&[4.0]))]),
        );
        std::fs::write(root.join("readme.txt"), "test").unwrap();

        let files = discover(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.parquet"),
                PathBuf::from("b.parquet"),
                PathBuf::from("subdir1/c.parquet"),
            ]
        );

        let ids: Vec<String> = read_all(root, ReaderOptions::new(1))
            .into_iter()
            .map(|r| r.unwrap().identifier)
            .collect();
        assert_eq!(ids, vec!["a:0", "b:0", "c:0", "c:1"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(&root.join("a.parquet"), &list_batch(&[("a", 0, Some(&[1.0]))]));
        std::fs::create_dir_all(root.join("sub")).unwrap();
        // A link back to the root would recurse forever if followed.
        std::os::unix::fs::symlink(root, root.join("sub").join("loop")).unwrap();
        std::os::unix::fs::symlink(root.join("a.parquet"), root.join("sub").join("b.parquet"))
            .unwrap();

        let files = discover(root).unwrap();
        assert_eq!(
            files,
            vec![root.join("a.parquet"), root.join("sub").join("b.parquet")]
        );
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(discover(tmp.path()).unwrap().is_empty());
        assert_eq!(read_all(tmp.path(), ReaderOptions::new(3)).len(), 0);
    }

    #[test]
    fn unreadable_file_is_reported_and_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("a_corrupt.parquet"), b"not parquet at all").unwrap();
        write(&root.join("b.parquet"), &list_batch(&[("b", 0, Some(&[2.0]))]));

        let items = read_all(root, ReaderOptions::new(1));
        assert_eq!(items.len(), 2);
        match &items[0] {
            Err(ReadError::Unreadable { path, .. }) => {
                assert!(path.ends_with("a_corrupt.parquet"))
            }
            other => panic!("expected unreadable file, got {other:?}"),
        }
        assert_eq!(items[1].as_ref().unwrap().identifier, "b:0");
    }

    #[test]
    fn discover_rejects_missing_and_non_parquet_paths() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover(&tmp.path().join("nope")),
            Err(ReadError::NotFound(_))
        ));

        let txt = tmp.path().join("notes.txt");
        std::fs::write(&txt, "x").unwrap();
        assert!(matches!(discover(&txt), Err(ReadError::NotParquet(_))));
    }

    #[test]
    fn integer_features_are_widened() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ints.parquet");
        let batch = RecordBatch::try_from_iter(vec![
            ("f0", Arc::new(Int32Array::from(vec![3])) as ArrayRef),
            ("f1", Arc::new(Int32Array::from(vec![-7])) as ArrayRef),
        ])
        .unwrap();
        write(&path, &batch);

        let records: Vec<_> = read_all(&path, ReaderOptions::new(2))
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records[0].vector, vec![3.0, -7.0]);
    }
}
