//! Precursor Pivot command-line front end.
//!
//! Usage: ppivot [OPTIONS] <COMMAND> <INPUT>

use clap::{ArgAction, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use precursor_pivot::output::TsvWriter;
use precursor_pivot::{
    AliasOrder, ColumnNames, IngestConfig, LoadError, LoadMode, LoadStatus, RecordStore, Session,
};

#[derive(Parser)]
#[command(name = "ppivot")]
#[command(version)]
#[command(about = "Load large precursor reports in parallel and print per-gene pivot tables", long_about = None)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Load mode: in-memory (map the whole file) or chunked (bounded reads)
    #[arg(long, global = true, default_value = "in-memory")]
    mode: LoadMode,

    /// Chunk size in MiB for chunked mode
    #[arg(long, global = true, default_value_t = 1024)]
    chunk_size: u64,

    /// Leaf size in KiB below which a byte range is parsed without splitting
    #[arg(long, global = true, default_value_t = 1024)]
    leaf_size: u64,

    /// Alias suffix order for colliding file names: file or first-seen
    #[arg(long, global = true, default_value = "file")]
    alias_order: AliasOrder,

    /// Header name of the gene column
    #[arg(long, global = true)]
    gene_column: Option<String>,

    /// Header name of the source file column
    #[arg(long, global = true)]
    file_column: Option<String>,

    /// Header name of the precursor id column
    #[arg(long, global = true)]
    precursor_column: Option<String>,

    /// Header name of the quantity column
    #[arg(long, global = true)]
    value_column: Option<String>,

    /// Print load statistics to stderr
    #[arg(long, global = true)]
    stats: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print record, gene, precursor and file counts
    Summary {
        /// Input report (tab-separated)
        input: PathBuf,
    },

    /// List all genes
    Genes {
        /// Input report (tab-separated)
        input: PathBuf,
    },

    /// List the precursor ids recorded for a gene
    Precursors {
        /// Input report (tab-separated)
        input: PathBuf,

        /// Gene to look up
        #[arg(short, long)]
        gene: String,
    },

    /// Print the original file name to alias mapping
    Aliases {
        /// Input report (tab-separated)
        input: PathBuf,
    },

    /// Print a precursor x file table of quantities for a gene
    Pivot {
        /// Input report (tab-separated)
        input: PathBuf,

        /// Gene to tabulate
        #[arg(short, long)]
        gene: String,

        /// Precursor ids to include (default: all of the gene, sorted)
        #[arg(short, long = "precursor")]
        precursors: Vec<String>,

        /// File aliases to include (default: all of the gene, sorted)
        #[arg(short, long = "file")]
        files: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
        {
            eprintln!("Error: failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let config = build_config(&cli);
    let session = Session::with_config(config);

    let result = match cli.command {
        Commands::Summary { input } => load(&session, &input, cli.mode, cli.stats)
            .and_then(|store| run_summary(&store)),
        Commands::Genes { input } => {
            load(&session, &input, cli.mode, cli.stats).and_then(|store| run_genes(&store))
        }
        Commands::Precursors { input, gene } => load(&session, &input, cli.mode, cli.stats)
            .and_then(|store| run_precursors(&store, &gene)),
        Commands::Aliases { input } => {
            load(&session, &input, cli.mode, cli.stats).and_then(|store| run_aliases(&store))
        }
        Commands::Pivot {
            input,
            gene,
            precursors,
            files,
        } => load(&session, &input, cli.mode, cli.stats)
            .and_then(|store| run_pivot(&store, &gene, precursors, files)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> IngestConfig {
    let defaults = ColumnNames::default();
    let columns = ColumnNames {
        group: cli.gene_column.clone().unwrap_or(defaults.group),
        source: cli.file_column.clone().unwrap_or(defaults.source),
        series: cli.precursor_column.clone().unwrap_or(defaults.series),
        value: cli.value_column.clone().unwrap_or(defaults.value),
    };

    IngestConfig::new()
        .with_mode(cli.mode)
        .with_chunk_size(cli.chunk_size.saturating_mul(1024 * 1024))
        .with_leaf_threshold(cli.leaf_size.saturating_mul(1024))
        .with_alias_order(cli.alias_order)
        .with_columns(columns)
}

fn load(
    session: &Session,
    input: &Path,
    mode: LoadMode,
    stats: bool,
) -> Result<std::sync::Arc<RecordStore>, LoadError> {
    if let LoadStatus::Loaded(load_stats) = session.load(input, mode)? {
        if stats {
            eprintln!("Load stats: {}", load_stats);
        }
    }
    session.store()
}

fn run_summary(store: &RecordStore) -> Result<(), LoadError> {
    let mut precursors: Vec<&str> = store.all().iter().map(|r| r.series_id()).collect();
    precursors.sort_unstable();
    precursors.dedup();

    let mut writer = TsvWriter::new(io::stdout().lock());
    writer.write_key_count("records", store.len())?;
    writer.write_key_count("genes", store.group_count())?;
    writer.write_key_count("precursors", precursors.len())?;
    writer.write_key_count("files", store.aliases().len())?;
    writer.flush()
}

fn run_genes(store: &RecordStore) -> Result<(), LoadError> {
    let mut writer = TsvWriter::new(io::stdout().lock());
    writer.write_list(store.groups())?;
    writer.flush()
}

fn run_precursors(store: &RecordStore, gene: &str) -> Result<(), LoadError> {
    let mut writer = TsvWriter::new(io::stdout().lock());
    writer.write_list(store.sorted_series_ids(gene))?;
    writer.flush()
}

fn run_aliases(store: &RecordStore) -> Result<(), LoadError> {
    let mut writer = TsvWriter::new(io::stdout().lock());
    writer.write_aliases(store.aliases())?;
    writer.flush()
}

fn run_pivot(
    store: &RecordStore,
    gene: &str,
    precursors: Vec<String>,
    files: Vec<String>,
) -> Result<(), LoadError> {
    let precursors: Vec<String> = if precursors.is_empty() {
        store
            .sorted_series_ids(gene)
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        precursors
    };

    // Selected files are shown in sorted order, like the chart's x-axis.
    let mut files: Vec<String> = if files.is_empty() {
        store
            .aliases_for_group(gene)
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        files
    };
    files.sort_unstable();
    files.dedup();

    let table = store.pivot(gene, &precursors, &files);

    let mut writer = TsvWriter::new(io::stdout().lock());
    writer.write_pivot(&table)?;
    writer.flush()
}
