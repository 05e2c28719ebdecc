//! Config-driven entry points for each pipeline step.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use cardlink_core::catalog::{load_catalog, load_flashcards, transcript_map};
use cardlink_core::config::PipelineConfig;
use cardlink_core::segmenter::Segmenter;
use cardlink_core::table::{read_rows, write_rows};
use cardlink_core::traits::{Classifier, Embedder};
use cardlink_vector::{build_and_save, FlashcardIndex, MatchParams};

use crate::controller::{RunController, RunPolicy, RunSummary, Sleeper};
use crate::match_stage::MatchStage;
use crate::merge::{collect_inputs, merge_outputs, MergeSummary};

/// Encodes the flashcard deck and writes the index file.
pub fn build_index(cfg: &PipelineConfig, embedder: &dyn Embedder, show_progress: bool) -> Result<FlashcardIndex> {
    let cards = load_flashcards(&cfg.path(&cfg.paths.flashcards))?;
    let path = cfg.path(&cfg.paths.index);
    build_and_save(embedder, &cards, cfg.index.batch_size, &path, show_progress)
        .with_context(|| format!("building flashcard index {}", path.display()))
}

/// Matches every catalogued transcript against the index and writes the
/// working table. Returns the number of rows written.
pub fn match_catalog(cfg: &PipelineConfig, embedder: &dyn Embedder, show_progress: bool) -> Result<usize> {
    let records = load_catalog(&cfg.path(&cfg.paths.catalog))?;
    let index = FlashcardIndex::load(&cfg.path(&cfg.paths.index))?;
    let stage = MatchStage::new(embedder, &index, Segmenter::new(cfg.segmenter.clone()), MatchParams::from(&cfg.matcher))?
        .with_encode_batch_size(cfg.matcher.encode_batch_size)
        .with_progress(show_progress);
    let rows = stage.run(&records)?;
    let path = cfg.path(&cfg.paths.mapped_table);
    let written = write_rows(&path, rows.iter())?;
    info!(path = %path.display(), rows = written, "saved working table");
    Ok(written)
}

/// Runs the resumable classification over the working table.
pub fn classify_table<'a>(
    cfg: &PipelineConfig,
    classifier: &'a dyn Classifier,
    sleeper: Box<dyn Sleeper + 'a>,
    show_progress: bool,
) -> Result<RunSummary> {
    let table = cfg.path(&cfg.paths.mapped_table);
    let mut rows = read_rows(&table).with_context(|| format!("reading working table {}", table.display()))?;
    let records = load_catalog(&cfg.path(&cfg.paths.catalog))?;
    let transcripts = transcript_map(&records);
    info!(rows = rows.len(), transcripts = transcripts.len(), "starting classification run");
    let controller = RunController::new(classifier, &transcripts, RunPolicy::from_config(cfg))
        .with_sleeper(sleeper)
        .with_progress(show_progress);
    controller.run(&mut rows)
}

/// Merges `inputs` (files or directories of artifacts), defaulting to the
/// final classified table.
pub fn merge(cfg: &PipelineConfig, inputs: &[PathBuf]) -> Result<MergeSummary> {
    let inputs = if inputs.is_empty() { vec![cfg.path(&cfg.paths.final_output)] } else { inputs.to_vec() };
    let files = collect_inputs(&inputs)?;
    merge_outputs(
        &files,
        &cfg.path(&cfg.paths.merged_output),
        &cfg.path(&cfg.paths.no_class_output),
        &cfg.path(&cfg.paths.with_class_output),
    )
}
