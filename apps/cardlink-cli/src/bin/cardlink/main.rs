mod cli;

use anyhow::{bail, Result};
use clap::Parser;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cardlink_classify::MessagesClassifier;
use cardlink_core::config::{Config, PipelineConfig};
use cardlink_embed::get_default_embedder;
use cardlink_pipeline::stages;
use cardlink_pipeline::{RunSummary, ThreadSleeper};

use crate::cli::{BuildIndexArgs, ClassifyArgs, Cli, Commands, MatchArgs};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load_from(&cli.config_dir, cli.env.as_deref())?.pipeline()?;
    let progress = !cli.no_progress;

    match cli.command {
        Commands::BuildIndex(args) => {
            apply_build_index(&mut cfg, &args);
            cfg.validate()?;
            let embedder = get_default_embedder(&cfg.embedding, &cfg.base_dir)?;
            stages::build_index(&cfg, embedder.as_ref(), progress)?;
        }
        Commands::Match(args) => {
            apply_match(&mut cfg, &args);
            cfg.validate()?;
            let embedder = get_default_embedder(&cfg.embedding, &cfg.base_dir)?;
            stages::match_catalog(&cfg, embedder.as_ref(), progress)?;
        }
        Commands::Classify(args) => {
            apply_classify(&mut cfg, &args);
            cfg.validate()?;
            classify(&cfg, progress)?;
        }
        Commands::Merge(args) => {
            stages::merge(&cfg, &args.inputs)?;
        }
        Commands::Pipeline(args) => {
            apply_classify(&mut cfg, &args.classify);
            cfg.validate()?;
            let embedder = get_default_embedder(&cfg.embedding, &cfg.base_dir)?;
            let index_path = cfg.path(&cfg.paths.index);
            if args.rebuild_index || !index_path.exists() {
                stages::build_index(&cfg, embedder.as_ref(), progress)?;
            } else {
                info!(path = %index_path.display(), "reusing existing flashcard index");
            }
            stages::match_catalog(&cfg, embedder.as_ref(), progress)?;
            classify(&cfg, progress)?;
            stages::merge(&cfg, &[])?;
        }
    }
    Ok(())
}

fn classify(cfg: &PipelineConfig, progress: bool) -> Result<RunSummary> {
    let classifier = MessagesClassifier::from_config(&cfg.classifier)?;
    let summary = stages::classify_table(cfg, &classifier, Box::new(ThreadSleeper), progress)?;
    info!(
        videos = summary.videos_total,
        processed = summary.videos_processed,
        skipped = summary.videos_skipped,
        calls = summary.classifier_calls,
        repaired = summary.repaired_responses,
        unparseable = summary.unparseable_responses,
        attempts = summary.attempts,
        "classification summary"
    );
    for (label, count) in &summary.labels {
        info!(label = %label, count, "labels assigned");
    }
    if !summary.completed {
        bail!(
            "classification stopped after {} attempts; partial results saved to {}",
            summary.attempts,
            cfg.path(&cfg.paths.final_output).display()
        );
    }
    Ok(summary)
}

fn path_string(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn apply_build_index(cfg: &mut PipelineConfig, args: &BuildIndexArgs) {
    if let Some(p) = &args.flashcards {
        cfg.paths.flashcards = path_string(p);
    }
    if let Some(p) = &args.index {
        cfg.paths.index = path_string(p);
    }
    if let Some(n) = args.batch_size {
        cfg.index.batch_size = n;
    }
}

fn apply_match(cfg: &mut PipelineConfig, args: &MatchArgs) {
    if let Some(p) = &args.catalog {
        cfg.paths.catalog = path_string(p);
    }
    if let Some(p) = &args.index {
        cfg.paths.index = path_string(p);
    }
    if let Some(p) = &args.output {
        cfg.paths.mapped_table = path_string(p);
    }
    if let Some(t) = args.threshold {
        cfg.matcher.threshold = t;
    }
    if let Some(k) = args.top_k {
        cfg.matcher.top_k = k;
    }
    if let Some(n) = args.max_paragraph_length {
        cfg.segmenter.max_paragraph_length = n;
    }
}

fn apply_classify(cfg: &mut PipelineConfig, args: &ClassifyArgs) {
    if let Some(p) = &args.table {
        cfg.paths.mapped_table = path_string(p);
    }
    if let Some(p) = &args.output_dir {
        cfg.paths.output_dir = path_string(p);
    }
    if let Some(n) = args.max_attempts {
        cfg.run.max_attempts = n;
    }
    if let Some(s) = args.backoff_secs {
        cfg.run.backoff_secs = s;
    }
}
