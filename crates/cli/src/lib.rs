use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use faultrank_chunker::TokenEncoding;
use faultrank_protocol::DEFAULT_VARIANT;
use faultrank_ranker::{ModelMode, RankerConfig};
use std::io;
use std::path::{Path, PathBuf};

mod rank;
mod score;
mod split;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    print_stdout(&serde_json::to_string_pretty(value)?)
}

#[derive(Parser)]
#[command(name = "faultrank")]
#[command(about = "Chunked conversational fault localization with language models", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML file with ranker settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank suspicious methods for each failing test of one or more bugs
    Rank(RankArgs),

    /// Score ranked outputs against ground truth (Top-K, MFR, MAR)
    Score(ScoreArgs),

    /// Split per-test coverage files into token-bounded chunks
    Split(SplitArgs),
}

#[derive(Args, Clone)]
struct DataArgs {
    /// Root of the study data directory
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Split (bucket) label of the chunked dataset
    #[arg(long, default_value = "5")]
    split: String,

    /// Dataset variant directory name
    #[arg(long, default_value = DEFAULT_VARIANT)]
    variant: String,
}

impl DataArgs {
    fn layout(&self) -> faultrank_protocol::StudyLayout {
        let mut layout = faultrank_protocol::StudyLayout::new(&self.data_dir, &self.split);
        layout.variant = self.variant.clone();
        layout
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModelModeArg {
    Openai,
    Stub,
}

impl From<ModelModeArg> for ModelMode {
    fn from(value: ModelModeArg) -> Self {
        match value {
            ModelModeArg::Openai => ModelMode::OpenAi,
            ModelModeArg::Stub => ModelMode::Stub,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EncodingArg {
    Cl100k,
    Approximate,
}

impl From<EncodingArg> for TokenEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Cl100k => TokenEncoding::Cl100k,
            EncodingArg::Approximate => TokenEncoding::Approximate,
        }
    }
}

#[derive(Args)]
struct RankArgs {
    /// Project name (e.g. Lang)
    #[arg(long)]
    project: String,

    /// Ranking technique the chunks were ordered by (e.g. ochiai)
    #[arg(long)]
    technique: String,

    /// Bug id; repeat for several bugs. Defaults to every bug directory found
    #[arg(long = "bug")]
    bugs: Vec<String>,

    #[command(flatten)]
    data: DataArgs,

    /// Read chunks from this directory instead of the layout (single bug only)
    #[arg(long)]
    chunks_dir: Option<PathBuf>,

    /// Write per-chunk artifacts here instead of the layout (single bug only)
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Write final artifacts here instead of the layout (single bug only)
    #[arg(long)]
    final_dir: Option<PathBuf>,

    /// Error log path (default: <data-dir>/error_log.txt)
    #[arg(long)]
    error_log: Option<PathBuf>,

    /// Also append every turn artifact to this combined file
    #[arg(long)]
    combined: Option<PathBuf>,

    /// Model adapter
    #[arg(long, value_enum)]
    model_mode: Option<ModelModeArg>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    api_base: Option<String>,

    /// Token ceiling for one prompt
    #[arg(long)]
    input_ceiling: Option<usize>,

    /// Token encoding used by the budget guard
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Bugs processed concurrently
    #[arg(long)]
    jobs: Option<usize>,

    /// Echo model output to stderr while it streams
    #[arg(long)]
    echo: bool,

    /// Print run statistics as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ScoreArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Project to score; repeat for several. Defaults to every project found
    #[arg(long = "project")]
    projects: Vec<String>,

    /// Technique to score; repeat for several. Defaults to every technique found
    #[arg(long = "technique")]
    techniques: Vec<String>,

    /// Report directory (default: <data-dir>/Results/Split)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print report rows as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SplitArgs {
    /// A `test_<id>.json` coverage file or a directory of them
    #[arg(long)]
    input: PathBuf,

    /// Output directory for `test_<id>_<chunk>.json` files
    #[arg(long)]
    out_dir: PathBuf,

    /// Token ceiling for one rendered chunk
    #[arg(long, default_value_t = 30_000)]
    max_chunk_tokens: usize,

    /// Token encoding used to measure chunks
    #[arg(long, value_enum, default_value = "cl100k")]
    encoding: EncodingArg,

    /// Print written paths as JSON on stdout
    #[arg(long)]
    json: bool,
}

/// Names of the immediate subdirectories of `dir`, in natural order.
fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort_by(|a, b| faultrank_eval::natural_cmp(a, b));
    Ok(names)
}

fn load_config(path: Option<&Path>) -> Result<RankerConfig> {
    let mut config = match path {
        Some(path) => RankerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RankerConfig::default(),
    };
    config
        .apply_env()
        .context("Invalid ranker settings in environment")?;
    Ok(config)
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    let json_output = match &cli.command {
        Commands::Rank(args) => args.json,
        Commands::Score(args) => args.json,
        Commands::Split(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if !cli.verbose {
        builder.filter_module("reqwest", log::LevelFilter::Warn);
        builder.filter_module("hyper", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Rank(args) => {
            let config = load_config(cli.config.as_deref())?;
            rank::run(args, config).await?;
        }
        Commands::Score(args) => score::run(args)?,
        Commands::Split(args) => split::run(args)?,
    }

    Ok(())
}
