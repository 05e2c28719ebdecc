//! Resumable classification run over the working table.
//!
//! Videos are visited in ascending title order. A video counts as done when
//! its `classified_<title>.csv` artifact exists or when every row already has
//! a label; done videos never reach the classifier again. Each video's rows
//! are sent in fixed-size batches, and the artifact is written once all its
//! batches are labeled.
//!
//! Any error inside the video loop is a run failure: the whole table is
//! written to the checkpoint file, the controller waits, and the loop starts
//! over (skipping finished work). The final table is written whether the run
//! completes or runs out of attempts.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use cardlink_classify::{classify_batch, ParseOutcome};
use cardlink_core::config::PipelineConfig;
use cardlink_core::table::{read_rows, write_rows};
use cardlink_core::traits::Classifier;
use cardlink_core::types::{ClassificationLabel, MatchRow};

use crate::progress_bar;

/// Waits between run attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub batch_size: usize,
    pub max_attempts: usize,
    pub backoff: Duration,
    pub output_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub final_output: PathBuf,
}

impl RunPolicy {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            batch_size: cfg.classifier.batch_size,
            max_attempts: cfg.run.max_attempts,
            backoff: Duration::from_secs(cfg.run.backoff_secs),
            output_dir: cfg.path(&cfg.paths.output_dir),
            checkpoint: cfg.path(&cfg.paths.checkpoint),
            final_output: cfg.path(&cfg.paths.final_output),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub videos_total: usize,
    /// Videos classified and written by this run.
    pub videos_processed: usize,
    /// Videos found already done on the last attempt.
    pub videos_skipped: usize,
    pub batches: usize,
    pub classifier_calls: usize,
    pub repaired_responses: usize,
    pub unparseable_responses: usize,
    pub labels: BTreeMap<String, usize>,
    pub attempts: usize,
    pub completed: bool,
}

impl RunSummary {
    fn record(&mut self, label: ClassificationLabel) {
        *self.labels.entry(label.as_str().to_string()).or_default() += 1;
    }

    pub fn label_count(&self, label: ClassificationLabel) -> usize {
        self.labels.get(label.as_str()).copied().unwrap_or(0)
    }
}

pub struct RunController<'a> {
    classifier: &'a dyn Classifier,
    transcripts: &'a HashMap<String, String>,
    policy: RunPolicy,
    sleeper: Box<dyn Sleeper + 'a>,
    show_progress: bool,
}

impl<'a> RunController<'a> {
    pub fn new(classifier: &'a dyn Classifier, transcripts: &'a HashMap<String, String>, policy: RunPolicy) -> Self {
        Self { classifier, transcripts, policy, sleeper: Box::new(ThreadSleeper), show_progress: false }
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper + 'a>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Classifies `rows` in place. Errors are only returned when the output
    /// directory or the final table cannot be written; a failed checkpoint
    /// write is logged and the run goes on.
    pub fn run(&self, rows: &mut [MatchRow]) -> Result<RunSummary> {
        fs::create_dir_all(&self.policy.output_dir)
            .with_context(|| format!("creating {}", self.policy.output_dir.display()))?;
        let mut summary = RunSummary::default();
        let mut written = HashSet::new();
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            summary.attempts = attempt;
            match self.process_videos(rows, &mut summary, &mut written) {
                Ok(()) => {
                    summary.completed = true;
                    break;
                }
                Err(e) => {
                    error!(attempt, max_attempts = attempts, error = %format!("{e:#}"), "classification run failed");
                    match write_rows(&self.policy.checkpoint, rows.iter()) {
                        Ok(saved) => {
                            info!(path = %self.policy.checkpoint.display(), rows = saved, "saved progress checkpoint")
                        }
                        Err(e) => error!(
                            path = %self.policy.checkpoint.display(),
                            error = %format!("{e:#}"),
                            "could not save progress checkpoint"
                        ),
                    }
                    if attempt < attempts {
                        warn!(backoff_secs = self.policy.backoff.as_secs(), attempt, "retrying after backoff");
                        self.sleeper.sleep(self.policy.backoff);
                    } else {
                        error!("max attempts reached; stopping");
                    }
                }
            }
        }

        let saved = write_rows(&self.policy.final_output, rows.iter())?;
        info!(
            path = %self.policy.final_output.display(),
            rows = saved,
            completed = summary.completed,
            videos_processed = summary.videos_processed,
            classifier_calls = summary.classifier_calls,
            "saved final table"
        );
        Ok(summary)
    }

    fn process_videos(
        &self,
        rows: &mut [MatchRow],
        summary: &mut RunSummary,
        written: &mut HashSet<String>,
    ) -> Result<()> {
        let videos = group_by_title(rows);
        summary.videos_total = videos.len();
        summary.videos_skipped = 0;
        let pb = progress_bar(videos.len(), "videos", self.show_progress);

        for (title, members) in &videos {
            pb.set_message(title.clone());
            let artifact = self.policy.output_dir.join(artifact_file_name(title));
            if artifact.exists() {
                hydrate_from_artifact(rows, members, &artifact);
                if !written.contains(title) {
                    summary.videos_skipped += 1;
                    info!(video = %title, "skipping video with existing artifact");
                }
                pb.inc(1);
                continue;
            }
            if members.iter().all(|&i| rows[i].classification.is_some()) {
                summary.videos_skipped += 1;
                info!(video = %title, "skipping already classified video");
                pb.inc(1);
                continue;
            }

            let cadmore_id = rows[members[0]].cadmore_id.clone();
            let transcript = match self.transcripts.get(&cadmore_id) {
                Some(t) => t.as_str(),
                None => {
                    warn!(video = %title, cadmore_id = %cadmore_id, "no transcript for video; classifying without context");
                    ""
                }
            };

            let pending: Vec<usize> = members.iter().copied().filter(|&i| rows[i].classification.is_none()).collect();
            for batch in pending.chunks(self.policy.batch_size.max(1)) {
                let flashcards: Vec<String> = batch.iter().map(|&i| rows[i].flashcard.clone()).collect();
                let result = classify_batch(self.classifier, transcript, &flashcards)
                    .with_context(|| format!("classifying a batch of '{}'", title))?;
                summary.classifier_calls += 1;
                summary.batches += 1;
                match result.outcome {
                    ParseOutcome::Strict => {}
                    ParseOutcome::Repaired => summary.repaired_responses += 1,
                    ParseOutcome::Unparseable => summary.unparseable_responses += 1,
                }
                for (&i, label) in batch.iter().zip(result.labels) {
                    rows[i].classification = Some(label);
                    summary.record(label);
                }
            }

            write_rows(&artifact, members.iter().map(|&i| &rows[i]))?;
            written.insert(title.clone());
            summary.videos_processed += 1;
            info!(video = %title, rows = members.len(), path = %artifact.display(), "saved video classifications");
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(())
    }
}

/// Row positions per video title, titles ascending, rows in table order.
fn group_by_title(rows: &[MatchRow]) -> BTreeMap<String, Vec<usize>> {
    let mut videos: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        videos.entry(row.video_title.clone()).or_default().push(i);
    }
    videos
}

/// Copies labels from a finished artifact into unlabeled rows of the video.
fn hydrate_from_artifact(rows: &mut [MatchRow], members: &[usize], artifact: &Path) {
    let saved = match read_rows(artifact) {
        Ok(saved) => saved,
        Err(e) => {
            warn!(path = %artifact.display(), error = %format!("{e:#}"), "could not read artifact; labels not restored");
            return;
        }
    };
    let labels: HashMap<(String, String), ClassificationLabel> = saved
        .into_iter()
        .filter_map(|r| {
            let label = r.classification?;
            Some(((r.transcript_chunk, r.flashcard_id), label))
        })
        .collect();
    for &i in members {
        if rows[i].classification.is_some() {
            continue;
        }
        let key = (rows[i].transcript_chunk.clone(), rows[i].flashcard_id.clone());
        if let Some(label) = labels.get(&key) {
            rows[i].classification = Some(*label);
        }
    }
}

/// `classified_<title>.csv`. Titles holding `_`, path separators or control
/// characters get those characters replaced by `_` and a short blake3 digest
/// of the raw title appended, so two titles never share an artifact.
pub fn artifact_file_name(video_title: &str) -> String {
    let safe: String = video_title
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    if safe.contains('_') {
        let digest = blake3::hash(video_title.as_bytes()).to_hex();
        format!("classified_{}-{}.csv", safe, &digest.as_str()[..12])
    } else {
        format!("classified_{}.csv", safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_filesystem_safe() {
        assert_eq!(artifact_file_name("Insulin basics"), "classified_Insulin basics.csv");
        let name = artifact_file_name("T3/T4\\axis\n");
        assert!(name.starts_with("classified_T3_T4_axis_-"), "{name}");
        assert!(name.ends_with(".csv"));
        assert!(!name.contains('/') && !name.contains('\\') && !name.contains('\n'));
    }

    #[test]
    fn titles_that_sanitize_alike_get_distinct_artifacts() {
        let names: HashSet<String> =
            ["T3/T4", "T3_T4", "T3\\T4", "T3\nT4"].iter().map(|t| artifact_file_name(t)).collect();
        assert_eq!(names.len(), 4);
    }
}
