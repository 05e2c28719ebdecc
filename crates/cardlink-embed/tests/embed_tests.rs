use std::path::Path;

use cardlink_core::config::EmbeddingConfig;
use cardlink_embed::{get_default_embedder, FakeEmbedder, FAKE_EMBEDDING_DIM};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn fake_embedder_shapes_and_determinism() {
    let cfg = EmbeddingConfig { fake: true, ..EmbeddingConfig::default() };
    let embedder = get_default_embedder(&cfg, Path::new(".")).expect("embedder");
    assert_eq!(embedder.dim(), FAKE_EMBEDDING_DIM);
    assert!(embedder.embedder_id().starts_with("fake:"));

    let texts = vec!["insulin lowers blood glucose".to_string(), "insulin lowers blood glucose".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), FAKE_EMBEDDING_DIM);
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn vectors_do_not_depend_on_batch_neighbours() {
    let e = FakeEmbedder::new(256);
    let alone = e.embed_text("TSH rises in primary hypothyroidism");
    let batch = cardlink_embed::Embedder::embed_batch(
        &e,
        &["unrelated text".to_string(), "TSH rises in primary hypothyroidism".to_string()],
    )
    .expect("batch");
    assert_eq!(batch[1], alone);
}

#[test]
fn shared_vocabulary_scores_higher_than_disjoint_text() {
    let e = FakeEmbedder::new(FAKE_EMBEDDING_DIM);
    let card = e.embed_text("Insulin lowers blood glucose");
    let related = e.embed_text("Beta cells secrete insulin to lower blood glucose");
    let unrelated = e.embed_text("The femur is the longest bone");
    assert!(cosine(&card, &related) > cosine(&card, &unrelated));
}

#[test]
fn missing_model_directory_is_an_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let cfg = EmbeddingConfig { model_dir: "no-such-model".into(), fake: false, ..EmbeddingConfig::default() };
    if std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok() || std::env::var("APP_MODEL_DIR").is_ok() {
        return;
    }
    let err = get_default_embedder(&cfg, tmp.path()).err().expect("missing model dir");
    assert!(err.to_string().contains("no-such-model"));
}
