use std::cell::RefCell;

use cardlink_classify::{classify_batch, parse_response, ParseOutcome};
use cardlink_core::traits::Classifier;
use cardlink_core::types::ClassificationLabel::{self, NoClass, NonRelevant, Primary, Secondary};

struct Scripted {
    response: String,
    seen: RefCell<Vec<(String, Vec<String>)>>,
}

impl Scripted {
    fn new(response: &str) -> Self {
        Self { response: response.to_string(), seen: RefCell::new(Vec::new()) }
    }
}

impl Classifier for Scripted {
    fn classify(&self, context: &str, items: &[String]) -> anyhow::Result<String> {
        self.seen.borrow_mut().push((context.to_string(), items.to_vec()));
        Ok(self.response.clone())
    }
}

fn labels(raw: &str, n: usize) -> Vec<ClassificationLabel> {
    parse_response(raw, n).labels
}

#[test]
fn unknown_phrase_becomes_no_class() {
    let parsed = parse_response(r#"{"Flashcard_1":"Primary","Flashcard_2":"foo"}"#, 2);
    assert_eq!(parsed.labels, vec![Primary, NoClass]);
    assert_eq!(parsed.outcome, ParseOutcome::Strict);
}

#[test]
fn single_quoted_braceless_response_is_repaired() {
    let parsed = parse_response("'Flashcard_1':'Secondary'", 1);
    assert_eq!(parsed.labels, vec![Secondary]);
    assert_eq!(parsed.outcome, ParseOutcome::Repaired);
}

#[test]
fn garbage_yields_no_class_for_every_slot() {
    let parsed = parse_response("I cannot classify these flashcards.", 3);
    assert_eq!(parsed.labels, vec![NoClass, NoClass, NoClass]);
    assert_eq!(parsed.outcome, ParseOutcome::Unparseable);
    assert_eq!(labels("", 2), vec![NoClass, NoClass]);
}

#[test]
fn slots_are_positional_and_missing_slots_are_no_class() {
    let raw = r#"{"Flashcard_3":"Non-Relevant","Flashcard_1":"secondary flashcard","Flashcard_9":"Primary"}"#;
    assert_eq!(labels(raw, 4), vec![Secondary, NoClass, NonRelevant, NoClass]);
}

#[test]
fn batch_makes_one_call_with_full_transcript_and_slot_order() {
    let classifier = Scripted::new(r#"{"Flashcard_1":"Non-Relevant","Flashcard_2":"Primary"}"#);
    let cards = vec!["Femur is long".to_string(), "Insulin lowers glucose".to_string()];
    let result = classify_batch(&classifier, "Full transcript text.", &cards).expect("batch");
    assert_eq!(result.labels, vec![NonRelevant, Primary]);

    let seen = classifier.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "Full transcript text.");
    assert_eq!(seen[0].1, cards);
}

#[test]
fn transport_errors_propagate() {
    struct Down;
    impl Classifier for Down {
        fn classify(&self, _context: &str, _items: &[String]) -> anyhow::Result<String> {
            anyhow::bail!("service unavailable")
        }
    }
    let err = classify_batch(&Down, "t", &["card".to_string()]).unwrap_err();
    assert!(err.to_string().contains("service unavailable"));
}
