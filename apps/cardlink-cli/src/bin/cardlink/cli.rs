use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cardlink",
    version,
    about = "Match lecture transcripts to flashcards and classify their relevance"
)]
pub struct Cli {
    /// Directory holding config.toml; relative paths resolve against it.
    #[arg(long, global = true, default_value = ".")]
    pub config_dir: PathBuf,

    /// Config overlay to apply (dev, prod, test). Defaults to RUST_ENV.
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Hide progress bars.
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode the flashcard deck into the index file.
    BuildIndex(BuildIndexArgs),
    /// Segment transcripts and match chunks against the index.
    Match(MatchArgs),
    /// Classify the working table, resuming from existing artifacts.
    Classify(ClassifyArgs),
    /// Merge classified files and split out `No Class` rows.
    Merge(MergeArgs),
    /// Run build-index (when needed), match, classify and merge.
    Pipeline(PipelineArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildIndexArgs {
    #[arg(long)]
    pub flashcards: Option<PathBuf>,
    #[arg(long)]
    pub index: Option<PathBuf>,
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MatchArgs {
    #[arg(long)]
    pub catalog: Option<PathBuf>,
    #[arg(long)]
    pub index: Option<PathBuf>,
    /// Working table to write.
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub threshold: Option<f32>,
    #[arg(long)]
    pub top_k: Option<usize>,
    #[arg(long)]
    pub max_paragraph_length: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ClassifyArgs {
    /// Working table to classify.
    #[arg(long)]
    pub table: Option<PathBuf>,
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    #[arg(long)]
    pub max_attempts: Option<usize>,
    #[arg(long)]
    pub backoff_secs: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MergeArgs {
    /// Classified CSV files or directories of `classified_*.csv`
    /// (defaults to the final classified table).
    pub inputs: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Rebuild the index even if the index file exists.
    #[arg(long)]
    pub rebuild_index: bool,
    #[command(flatten)]
    pub classify: ClassifyArgs,
}
