use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use cardlink_core::config::PipelineConfig;
use cardlink_core::table::{read_rows, write_rows};
use cardlink_core::traits::{Classifier, Embedder};
use cardlink_core::types::{ClassificationLabel, MatchRow};
use cardlink_pipeline::stages::{build_index, classify_table, match_catalog, merge};
use cardlink_pipeline::{artifact_file_name, RunController, RunPolicy, Sleeper};

/// Answers every batch with `Primary` for each slot and records what it saw.
#[derive(Default)]
struct Scripted {
    calls: RefCell<Vec<(String, Vec<String>)>>,
    fail_first: Cell<usize>,
}

impl Scripted {
    fn failing_first(n: usize) -> Self {
        Self { fail_first: Cell::new(n), ..Self::default() }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Classifier for Scripted {
    fn classify(&self, context: &str, items: &[String]) -> anyhow::Result<String> {
        if self.fail_first.get() > 0 {
            self.fail_first.set(self.fail_first.get() - 1);
            anyhow::bail!("service unavailable");
        }
        self.calls.borrow_mut().push((context.to_string(), items.to_vec()));
        let slots: Vec<String> = (1..=items.len()).map(|i| format!("\"Flashcard_{i}\":\"Primary\"")).collect();
        Ok(format!("{{{}}}", slots.join(",")))
    }
}

#[derive(Default)]
struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl Sleeper for &RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

/// Two-dimensional encoder with fixed vectors for the texts used below.
struct TableEmbedder;

impl Embedder for TableEmbedder {
    fn embedder_id(&self) -> &str {
        "table:d2"
    }

    fn dim(&self) -> usize {
        2
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let b = (1.0f32 - 0.72 * 0.72).sqrt();
        Ok(texts
            .iter()
            .map(|t| match t.as_str() {
                "Insulin regulates blood glucose." => vec![1.0, 0.0],
                "Beta cells secrete insulin." => vec![0.0, -1.0],
                "Insulin lowers blood glucose" => vec![0.72, b],
                _ => vec![-1.0, 0.0],
            })
            .collect())
    }
}

fn row(title: &str, cadmore: &str, chunk: &str, id: &str) -> MatchRow {
    MatchRow {
        category_title: "Endocrine".into(),
        subcategory_title: "Pancreas".into(),
        video_id: "1".into(),
        cadmore_id: cadmore.into(),
        video_title: title.into(),
        product: "Step 1".into(),
        video_url: String::new(),
        updated_status: String::new(),
        transcript_chunk: chunk.into(),
        flashcard: format!("card {id}"),
        flashcard_id: id.into(),
        score: 0.7,
        classification: None,
    }
}

fn policy(dir: &Path, batch_size: usize, max_attempts: usize) -> RunPolicy {
    RunPolicy {
        batch_size,
        max_attempts,
        backoff: Duration::from_secs(600),
        output_dir: dir.join("classified"),
        checkpoint: dir.join("progress_on_error.csv"),
        final_output: dir.join("final.csv"),
    }
}

fn transcripts() -> HashMap<String, String> {
    HashMap::from([
        ("cad-a".to_string(), "Anatomy transcript.".to_string()),
        ("cad-b".to_string(), "Biochemistry transcript.".to_string()),
    ])
}

#[test]
fn existing_artifact_means_no_classifier_calls_for_that_video() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(tmp.path(), 5, 1);
    let mut done = row("Anatomy", "cad-a", "chunk a", "1");
    done.classification = Some(ClassificationLabel::Secondary);
    write_rows(&policy.output_dir.join(artifact_file_name("Anatomy")), [&done]).unwrap();

    let mut rows = vec![row("Biochemistry", "cad-b", "chunk b", "2"), row("Anatomy", "cad-a", "chunk a", "1")];
    let classifier = Scripted::default();
    let transcripts = transcripts();
    let summary = RunController::new(&classifier, &transcripts, policy.clone()).run(&mut rows).unwrap();

    assert_eq!(classifier.call_count(), 1);
    assert_eq!(classifier.calls.borrow()[0].0, "Biochemistry transcript.");
    assert_eq!(summary.videos_skipped, 1);
    assert_eq!(summary.videos_processed, 1);
    assert!(summary.completed);
    // restored from the artifact
    assert_eq!(rows[1].classification, Some(ClassificationLabel::Secondary));
    assert!(policy.output_dir.join("classified_Biochemistry.csv").exists());

    let rerun = Scripted::default();
    let mut again = vec![row("Biochemistry", "cad-b", "chunk b", "2"), row("Anatomy", "cad-a", "chunk a", "1")];
    let summary = RunController::new(&rerun, &transcripts, policy).run(&mut again).unwrap();
    assert_eq!(rerun.call_count(), 0);
    assert_eq!(summary.videos_skipped, 2);
    assert!(again.iter().all(|r| r.classification.is_some()));
}

#[test]
fn videos_run_in_title_order_with_positional_batches() {
    let tmp = TempDir::new().unwrap();
    let mut rows: Vec<MatchRow> = (1..=7).map(|i| row("Biochemistry", "cad-b", "c", &i.to_string())).collect();
    rows.insert(3, row("Anatomy", "cad-a", "c", "a1"));
    let classifier = Scripted::default();
    let transcripts = transcripts();
    let summary = RunController::new(&classifier, &transcripts, policy(tmp.path(), 5, 1)).run(&mut rows).unwrap();

    let calls = classifier.calls.borrow();
    let batches: Vec<Vec<String>> = calls.iter().map(|c| c.1.clone()).collect();
    assert_eq!(
        batches,
        vec![
            vec!["card a1".to_string()],
            (1..=5).map(|i| format!("card {i}")).collect(),
            vec!["card 6".to_string(), "card 7".to_string()],
        ]
    );
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.label_count(ClassificationLabel::Primary), 8);
}

#[test]
fn labeled_batches_are_not_resubmitted() {
    let tmp = TempDir::new().unwrap();
    let mut rows: Vec<MatchRow> = (1..=4).map(|i| row("Anatomy", "cad-a", "c", &i.to_string())).collect();
    rows[0].classification = Some(ClassificationLabel::NonRelevant);
    rows[1].classification = Some(ClassificationLabel::Secondary);
    let classifier = Scripted::default();
    let transcripts = transcripts();
    RunController::new(&classifier, &transcripts, policy(tmp.path(), 2, 1)).run(&mut rows).unwrap();

    assert_eq!(classifier.call_count(), 1);
    assert_eq!(classifier.calls.borrow()[0].1, vec!["card 3".to_string(), "card 4".to_string()]);
    assert_eq!(rows[0].classification, Some(ClassificationLabel::NonRelevant));
    assert_eq!(rows[3].classification, Some(ClassificationLabel::Primary));
}

#[test]
fn mixed_batches_only_send_unlabeled_rows() {
    let tmp = TempDir::new().unwrap();
    let mut rows = vec![row("Anatomy", "cad-a", "c", "1"), row("Anatomy", "cad-a", "c", "2")];
    rows[0].classification = Some(ClassificationLabel::NonRelevant);
    let classifier = Scripted::default();
    let transcripts = transcripts();
    RunController::new(&classifier, &transcripts, policy(tmp.path(), 5, 1)).run(&mut rows).unwrap();

    assert_eq!(*classifier.calls.borrow(), vec![("Anatomy transcript.".to_string(), vec!["card 2".to_string()])]);
    assert_eq!(rows[0].classification, Some(ClassificationLabel::NonRelevant));
    assert_eq!(rows[1].classification, Some(ClassificationLabel::Primary));
}

#[test]
fn titles_differing_only_by_separator_are_both_classified() {
    let tmp = TempDir::new().unwrap();
    let mut rows = vec![row("T3/T4", "cad-a", "c", "1"), row("T3_T4", "cad-b", "c", "2")];
    let classifier = Scripted::default();
    let transcripts = transcripts();
    let policy = policy(tmp.path(), 5, 1);
    let summary = RunController::new(&classifier, &transcripts, policy.clone()).run(&mut rows).unwrap();

    assert_eq!(classifier.call_count(), 2);
    assert_eq!(summary.videos_processed, 2);
    assert!(rows.iter().all(|r| r.classification == Some(ClassificationLabel::Primary)));
    assert_ne!(artifact_file_name("T3/T4"), artifact_file_name("T3_T4"));
    assert!(policy.output_dir.join(artifact_file_name("T3/T4")).exists());
    assert!(policy.output_dir.join(artifact_file_name("T3_T4")).exists());
}

#[test]
fn unwritable_checkpoint_does_not_stop_the_run() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("blocker.txt"), "not a directory").unwrap();
    let mut policy = policy(tmp.path(), 5, 2);
    policy.checkpoint = tmp.path().join("blocker.txt/cp.csv");
    let mut rows = vec![row("Anatomy", "cad-a", "c", "1")];
    let classifier = Scripted::failing_first(1);
    let sleeper = RecordingSleeper::default();
    let transcripts = transcripts();
    let summary = RunController::new(&classifier, &transcripts, policy.clone())
        .with_sleeper(Box::new(&sleeper))
        .run(&mut rows)
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.attempts, 2);
    assert!(!policy.checkpoint.exists());
    let final_rows = read_rows(&policy.final_output).unwrap();
    assert_eq!(final_rows[0].classification, Some(ClassificationLabel::Primary));
}

#[test]
fn missing_transcript_sends_empty_context() {
    let tmp = TempDir::new().unwrap();
    let mut rows = vec![row("Orphan", "cad-missing", "c", "1")];
    let classifier = Scripted::default();
    let transcripts = transcripts();
    RunController::new(&classifier, &transcripts, policy(tmp.path(), 5, 1)).run(&mut rows).unwrap();
    assert_eq!(classifier.calls.borrow()[0].0, "");
}

#[test]
fn failure_checkpoints_waits_and_resumes() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(tmp.path(), 1, 3);
    let mut rows = vec![row("Anatomy", "cad-a", "c", "1"), row("Biochemistry", "cad-b", "c", "2")];
    let classifier = Scripted::failing_first(1);
    let sleeper = RecordingSleeper::default();
    let transcripts = transcripts();
    let summary = RunController::new(&classifier, &transcripts, policy.clone())
        .with_sleeper(Box::new(&sleeper))
        .run(&mut rows)
        .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.attempts, 2);
    assert_eq!(*sleeper.waits.borrow(), vec![Duration::from_secs(600)]);
    assert!(policy.checkpoint.exists());
    let final_rows = read_rows(&policy.final_output).unwrap();
    assert!(final_rows.iter().all(|r| r.classification == Some(ClassificationLabel::Primary)));
}

#[test]
fn exhausted_attempts_still_write_the_final_table() {
    let tmp = TempDir::new().unwrap();
    let policy = policy(tmp.path(), 5, 2);
    let mut rows = vec![row("Anatomy", "cad-a", "c", "1")];
    let classifier = Scripted::failing_first(usize::MAX);
    let sleeper = RecordingSleeper::default();
    let transcripts = transcripts();
    let summary = RunController::new(&classifier, &transcripts, policy.clone())
        .with_sleeper(Box::new(&sleeper))
        .run(&mut rows)
        .unwrap();

    assert!(!summary.completed);
    assert_eq!(summary.attempts, 2);
    assert_eq!(sleeper.waits.borrow().len(), 1);
    let final_rows = read_rows(&policy.final_output).unwrap();
    assert_eq!(final_rows.len(), 1);
    assert_eq!(final_rows[0].classification, None);
    assert!(!policy.output_dir.join("classified_Anatomy.csv").exists());
}

#[test]
fn end_to_end_from_catalog_to_review_files() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("data")).unwrap();
    fs::write(
        tmp.path().join("data/transcripts.json"),
        r#"[{"videoID": 7, "cadmoreAlternateID": "cad-ins", "categoryTitle": "Endocrine",
             "videoTitle": "Insulin basics",
             "Transcript": "Insulin regulates blood glucose. Beta cells secrete insulin."}]"#,
    )
    .unwrap();
    fs::write(
        tmp.path().join("data/flashcards.csv"),
        "id,text\nfc-1,Insulin lowers blood glucose\nfc-2,The femur is the longest bone\nfc-3,Glucagon raises blood sugar\n",
    )
    .unwrap();

    let mut cfg = PipelineConfig::default();
    cfg.base_dir = tmp.path().to_path_buf();
    cfg.segmenter.max_paragraph_length = 5;
    cfg.run.backoff_secs = 0;

    let index = build_index(&cfg, &TableEmbedder, false).unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(match_catalog(&cfg, &TableEmbedder, false).unwrap(), 1);

    let mapped = read_rows(&cfg.path(&cfg.paths.mapped_table)).unwrap();
    assert_eq!(mapped[0].transcript_chunk, "Insulin regulates blood glucose.");
    assert_eq!(mapped[0].flashcard_id, "fc-1");
    assert_eq!(mapped[0].score, 0.72);
    assert_eq!(mapped[0].video_id, "7");
    assert!(mapped.iter().all(|r| r.flashcard_id == "fc-1"));

    let classifier = Scripted::default();
    let summary = classify_table(&cfg, &classifier, Box::new(&RecordingSleeper::default()), false).unwrap();
    assert!(summary.completed);
    assert_eq!(classifier.call_count(), 1);
    assert!(classifier.calls.borrow()[0].0.starts_with("Insulin regulates blood glucose."));

    let classified = read_rows(&cfg.path(&cfg.paths.final_output)).unwrap();
    assert_eq!(classified[0].classification, Some(ClassificationLabel::Primary));
    assert!(cfg.path(&cfg.paths.output_dir).join("classified_Insulin basics.csv").exists());

    let merged = merge(&cfg, &[]).unwrap();
    assert_eq!((merged.total, merged.no_class, merged.with_class), (1, 0, 1));
}

#[test]
fn merge_splits_no_class_rows_from_everything_else() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("classified");
    let mut a = row("Anatomy", "cad-a", "c", "1");
    a.classification = Some(ClassificationLabel::NoClass);
    let mut b = row("Anatomy", "cad-a", "c", "2");
    b.classification = Some(ClassificationLabel::Primary);
    let c = row("Biochemistry", "cad-b", "c", "3");
    write_rows(&dir.join("classified_Anatomy.csv"), [&a, &b]).unwrap();
    write_rows(&dir.join("classified_Biochemistry.csv"), [&c]).unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let mut cfg = PipelineConfig::default();
    cfg.base_dir = tmp.path().to_path_buf();
    let summary = merge(&cfg, &[dir]).unwrap();
    assert_eq!(summary.inputs, 2);
    assert_eq!((summary.total, summary.no_class, summary.with_class), (3, 1, 2));

    let no_class = read_rows(&cfg.path(&cfg.paths.no_class_output)).unwrap();
    assert_eq!(no_class, vec![a]);
    let with_class = read_rows(&cfg.path(&cfg.paths.with_class_output)).unwrap();
    assert_eq!(with_class, vec![b, c]);
}
