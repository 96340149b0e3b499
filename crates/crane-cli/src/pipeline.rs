//! Classification pipeline: config, reader, scorer and writer wired together
//! for one invocation.

use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use crane_ai::{ScoreError, Scorer};
use crane_core::{Classifier, ConfigError, EmbeddingRecord, ScoreResult};
use crane_store::reader::{DEFAULT_BATCH_SIZE, DEFAULT_EMBEDDING_COLUMN, DEFAULT_ID_COLUMNS};
use crane_store::{
    EmbeddingReader, ReadError, ReaderOptions, ResultWriter, SchemaError, WriteError, discover,
    input_root,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Name of the merged output file when the input is a directory.
const MERGED_FILE_NAME: &str = "results.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// One CSV for the whole run.
    #[default]
    Merged,
    /// One CSV per input file, mirroring the input tree.
    PerFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ErrorPolicy {
    /// Log, count, and carry on.
    #[default]
    Skip,
    /// Abort the run.
    Fail,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("schema error: {0}")]
    Schema(SchemaError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("run exceeded its {budget:?} budget after writing {records_written} records")]
    Timeout {
        budget: Duration,
        records_written: usize,
    },

    #[error("invalid output path {path}: {reason}")]
    Output { path: PathBuf, reason: String },

    #[error("a worker thread panicked")]
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ConfigLoaded,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ConfigLoaded => "config-loaded",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!(from = %state, to = %next, "pipeline state");
    *state = next;
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub output_mode: OutputMode,
    pub batch_size: usize,
    pub on_schema_error: ErrorPolicy,
    pub on_unreadable_file: ErrorPolicy,
    pub embedding_column: String,
    pub id_columns: Vec<String>,
    /// Worker threads for per-file output.
    pub jobs: usize,
    pub timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            output_mode: OutputMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            on_schema_error: ErrorPolicy::default(),
            on_unreadable_file: ErrorPolicy::default(),
            embedding_column: DEFAULT_EMBEDDING_COLUMN.to_string(),
            id_columns: DEFAULT_ID_COLUMNS.iter().map(|c| c.to_string()).collect(),
            jobs: 1,
            timeout: None,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_total: usize,
    pub files_skipped: Vec<PathBuf>,
    /// Rows pulled from input, including rows later skipped.
    pub records_read: usize,
    pub records_written: usize,
    /// Rows skipped for schema errors.
    pub records_skipped: usize,
    pub undefined_decisions: usize,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    pub fn files_processed(&self) -> usize {
        self.files_total.saturating_sub(self.files_skipped.len())
    }

    fn merge(&mut self, other: RunSummary) {
        self.files_skipped.extend(other.files_skipped);
        self.records_read += other.records_read;
        self.records_written += other.records_written;
        self.records_skipped += other.records_skipped;
        self.undefined_decisions += other.undefined_decisions;
        self.outputs.extend(other.outputs);
    }
}

/// Run one classification: load the config at `config_path`, score every
/// record under `options.input`, and write results to `options.output`.
///
/// The config is validated before any output is created.
pub fn run(config_path: &Path, options: &PipelineOptions) -> Result<RunSummary, PipelineError> {
    let started = Instant::now();
    let mut state = PipelineState::Idle;

    match execute(config_path, options, &mut state) {
        Ok(summary) => {
            transition(&mut state, PipelineState::Completed);
            info!(
                files = summary.files_total,
                files_processed = summary.files_processed(),
                files_skipped = summary.files_skipped.len(),
                records_read = summary.records_read,
                records_written = summary.records_written,
                records_skipped = summary.records_skipped,
                undefined_decisions = summary.undefined_decisions,
                outputs = summary.outputs.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "classification complete"
            );
            if summary.undefined_decisions > 0 {
                warn!(
                    count = summary.undefined_decisions,
                    "some scores were NaN; their decisions are left empty"
                );
            }
            Ok(summary)
        }
        Err(err) => {
            transition(&mut state, PipelineState::Failed);
            error!(error = %err, "classification failed");
            Err(err)
        }
    }
}

fn execute(
    config_path: &Path,
    options: &PipelineOptions,
    state: &mut PipelineState,
) -> Result<RunSummary, PipelineError> {
    let classifier = Classifier::load(config_path)?;
    transition(state, PipelineState::ConfigLoaded);
    info!(
        config = %config_path.display(),
        classes = classifier.num_classes(),
        class_names = ?classifier.classes(),
        dim = classifier.dim(),
        metadata = ?classifier.metadata(),
        "loaded classifier"
    );

    let files = discover(&options.input)?;
    let root = input_root(&options.input);
    info!(input = %options.input.display(), files = files.len(), "discovered input files");

    let ctx = RunContext {
        classifier: &classifier,
        scorer: Scorer::new(&classifier),
        options,
        deadline: Deadline::start(options.timeout),
    };

    transition(state, PipelineState::Running);
    match options.output_mode {
        OutputMode::Merged => ctx.run_merged(&root, files),
        OutputMode::PerFile => ctx.run_per_file(&root, files),
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    fn check(&self, records_written: usize) -> Result<(), PipelineError> {
        match self.budget {
            Some(budget) if self.started.elapsed() >= budget => Err(PipelineError::Timeout {
                budget,
                records_written,
            }),
            _ => Ok(()),
        }
    }
}

/// Shared, read-only state for one run. Workers borrow it.
struct RunContext<'a> {
    classifier: &'a Classifier,
    scorer: Scorer<'a>,
    options: &'a PipelineOptions,
    deadline: Deadline,
}

impl RunContext<'_> {
    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            dim: self.classifier.dim(),
            batch_size: self.batch_size(),
            embedding_column: self.options.embedding_column.clone(),
            id_columns: self.options.id_columns.clone(),
        }
    }

    fn batch_size(&self) -> usize {
        self.options.batch_size.max(1)
    }

    fn run_merged(&self, root: &Path, files: Vec<PathBuf>) -> Result<RunSummary, PipelineError> {
        let path = merged_output_path(&self.options.input, &self.options.output);
        let mut summary = RunSummary {
            files_total: files.len(),
            ..RunSummary::default()
        };

        let mut writer = ResultWriter::create(&path, self.classifier.classes())?;
        let reader = EmbeddingReader::from_files(root.to_path_buf(), files, self.reader_options());
        self.process(reader, &mut writer, &mut summary)?;
        writer.finish()?;

        info!(output = %path.display(), rows = summary.records_written, "wrote results");
        summary.outputs.push(path);
        Ok(summary)
    }

    fn run_per_file(&self, root: &Path, files: Vec<PathBuf>) -> Result<RunSummary, PipelineError> {
        let output = &self.options.output;
        if output.is_file() {
            return Err(PipelineError::Output {
                path: output.clone(),
                reason: "per-file output needs a directory, found a file".to_string(),
            });
        }

        let mut summary = RunSummary {
            files_total: files.len(),
            ..RunSummary::default()
        };
        let jobs = self.options.jobs.clamp(1, files.len().max(1));

        if jobs == 1 {
            for file in &files {
                self.run_file(root, file, &mut summary)?;
            }
            return Ok(summary);
        }

        debug!(jobs, "scoring files in parallel");
        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let (next, failed, files) = (&next, &failed, &files);

        let results: Vec<Result<RunSummary, PipelineError>> = thread::scope(|scope| {
            let workers: Vec<_> = (0..jobs)
                .map(|_| {
                    scope.spawn(move || {
                        let mut partial = RunSummary::default();
                        while !failed.load(Ordering::Relaxed) {
                            let Some(file) = files.get(next.fetch_add(1, Ordering::Relaxed))
                            else {
                                break;
                            };
                            if let Err(err) = self.run_file(root, file, &mut partial) {
                                failed.store(true, Ordering::Relaxed);
                                return Err(err);
                            }
                        }
                        Ok(partial)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().unwrap_or(Err(PipelineError::Worker)))
                .collect()
        });

        for result in results {
            summary.merge(result?);
        }
        summary.outputs.sort();
        summary.files_skipped.sort();
        Ok(summary)
    }

    /// Score one input file into its mirrored CSV under the output directory.
    fn run_file(
        &self,
        root: &Path,
        file: &Path,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let rel = file.strip_prefix(root).unwrap_or(file);
        let out = self.options.output.join(rel).with_extension("csv");

        let mut records = EmbeddingReader::from_files(
            root.to_path_buf(),
            vec![file.to_path_buf()],
            self.reader_options(),
        )
        .peekable();

        // A file that cannot be opened gets no output at all.
        if matches!(records.peek(), Some(Err(ReadError::Unreadable { .. }))) {
            if let Some(Err(err)) = records.next() {
                self.unreadable(err, summary)?;
            }
            return Ok(());
        }

        let mut writer = ResultWriter::create(&out, self.classifier.classes())?;
        let written_before = summary.records_written;
        self.process(records, &mut writer, summary)?;
        writer.finish()?;

        debug!(
            input = %rel.display(),
            output = %out.display(),
            rows = summary.records_written - written_before,
            "wrote results"
        );
        summary.outputs.push(out);
        Ok(())
    }

    /// Pull records, score them in batches, and write them in order.
    fn process(
        &self,
        records: impl Iterator<Item = Result<EmbeddingRecord, ReadError>>,
        writer: &mut ResultWriter,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let batch_size = self.batch_size();
        let mut batch = Vec::with_capacity(batch_size);

        for item in records {
            match item {
                Ok(record) => {
                    summary.records_read += 1;
                    batch.push(record);
                    if batch.len() >= batch_size {
                        let full = mem::replace(&mut batch, Vec::with_capacity(batch_size));
                        self.flush(full, writer, summary)?;
                    }
                }
                Err(ReadError::Schema(err)) => {
                    summary.records_read += 1;
                    match self.options.on_schema_error {
                        ErrorPolicy::Skip => {
                            warn!(identifier = %err.identifier, reason = %err.kind, "skipping record");
                            summary.records_skipped += 1;
                            // Runs of bad rows never reach a batch boundary.
                            self.deadline.check(summary.records_written)?;
                        }
                        ErrorPolicy::Fail => return Err(PipelineError::Schema(err)),
                    }
                }
                Err(err) => self.unreadable(err, summary)?,
            }
        }

        if !batch.is_empty() {
            self.flush(batch, writer, summary)?;
        }
        Ok(())
    }

    fn flush(
        &self,
        batch: Vec<EmbeddingRecord>,
        writer: &mut ResultWriter,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        self.deadline.check(summary.records_written)?;

        let results = self.scorer.score(batch)?;
        writer.write_batch(&results)?;

        summary.records_written += results.len();
        summary.undefined_decisions += results
            .iter()
            .map(ScoreResult::undefined_decisions)
            .sum::<usize>();
        debug!(rows = results.len(), total = summary.records_written, "scored batch");
        Ok(())
    }

    /// Apply the unreadable-file policy. Any other read error is fatal.
    fn unreadable(&self, err: ReadError, summary: &mut RunSummary) -> Result<(), PipelineError> {
        match (err, self.options.on_unreadable_file) {
            (ReadError::Unreadable { path, reason }, ErrorPolicy::Skip) => {
                warn!(file = %path.display(), %reason, "skipping unreadable file");
                summary.files_skipped.push(path);
                Ok(())
            }
            (err, _) => Err(err.into()),
        }
    }
}

/// Where merged output goes. An existing directory gets a file named after
/// the input inside it.
fn merged_output_path(input: &Path, output: &Path) -> PathBuf {
    if !output.is_dir() {
        return output.to_path_buf();
    }
    match input.file_stem() {
        Some(stem) if input.is_file() => {
            let mut name = stem.to_os_string();
            name.push(".csv");
            output.join(name)
        }
        _ => output.join(MERGED_FILE_NAME),
    }
}
