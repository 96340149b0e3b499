mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use crane_store::reader::{DEFAULT_BATCH_SIZE, DEFAULT_EMBEDDING_COLUMN, DEFAULT_ID_COLUMNS};
use tracing_subscriber::EnvFilter;

use crate::pipeline::{ErrorPolicy, OutputMode, PipelineOptions};

#[derive(Parser)]
#[command(
    name = "crane",
    about = "Apply a linear classifier to Parquet embeddings",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    classify: ClassifyArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Score embeddings and write per-class results (the default).
    Classify(ClassifyArgs),
    /// Print the version.
    Version,
}

#[derive(Debug, Clone, Args)]
struct ClassifyArgs {
    /// Parquet file, or a directory searched recursively for them.
    #[arg(long, env = "CRANE_INPUT", default_value = "/mnt/input")]
    input: PathBuf,

    /// CSV file, or a directory to write into.
    #[arg(long, env = "CRANE_OUTPUT", default_value = "/mnt/output")]
    output: PathBuf,

    /// Model configuration (JSON).
    #[arg(long, env = "CRANE_CONFIG", default_value = "/mnt/config/config.json")]
    config: PathBuf,

    /// Records scored per batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = positive)]
    batch_size: usize,

    #[arg(long, value_enum, default_value_t = OutputMode::Merged)]
    output_mode: OutputMode,

    #[arg(long, value_enum, default_value_t = ErrorPolicy::Skip)]
    on_schema_error: ErrorPolicy,

    #[arg(long, value_enum, default_value_t = ErrorPolicy::Skip)]
    on_unreadable_file: ErrorPolicy,

    /// List-typed column holding each embedding.
    #[arg(long, default_value = DEFAULT_EMBEDDING_COLUMN)]
    embedding_column: String,

    /// Column forming the record identifier; repeat for several
    /// [default: source, offset, channel].
    #[arg(long = "id-column")]
    id_columns: Vec<String>,

    /// Worker threads (per-file output only).
    #[arg(long, default_value_t = 1, value_parser = positive)]
    jobs: usize,

    /// Give up after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl ClassifyArgs {
    fn pipeline_options(&self) -> PipelineOptions {
        let id_columns = if self.id_columns.is_empty() {
            DEFAULT_ID_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            self.id_columns.clone()
        };
        PipelineOptions {
            input: self.input.clone(),
            output: self.output.clone(),
            output_mode: self.output_mode,
            batch_size: self.batch_size,
            on_schema_error: self.on_schema_error,
            on_unreadable_file: self.on_unreadable_file,
            embedding_column: self.embedding_column.clone(),
            id_columns,
            jobs: self.jobs,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

fn positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let args = match cli.command {
        Some(Command::Version) => {
            println!("crane {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Some(Command::Classify(args)) => args,
        None => cli.classify,
    };

    init_logging(args.verbose);
    match classify(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn classify(args: &ClassifyArgs) -> anyhow::Result<()> {
    tracing::info!("crane v{}", env!("CARGO_PKG_VERSION"));

    if !args.input.exists() {
        bail!("input path not found: {}", args.input.display());
    }
    if !args.config.is_file() {
        bail!("config file not found: {}", args.config.display());
    }

    pipeline::run(&args.config, &args.pipeline_options())
        .with_context(|| format!("classifying {}", args.input.display()))?;
    Ok(())
}
