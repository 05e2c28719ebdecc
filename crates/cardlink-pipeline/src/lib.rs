//! Pipeline stages over the working table: matching transcripts to
//! flashcards, resumable classification and merging of review files.

pub mod controller;
pub mod match_stage;
pub mod merge;
pub mod stages;

pub use controller::{artifact_file_name, RunController, RunPolicy, RunSummary, Sleeper, ThreadSleeper};
pub use match_stage::MatchStage;
pub use merge::{collect_inputs, merge_outputs, MergeSummary};

pub(crate) fn progress_bar(len: usize, unit: &str, show: bool) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let template = format!("{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} {{msg}}");
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}
