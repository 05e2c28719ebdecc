//! cardlink-embed
//!
//! Sentence encoders implementing `cardlink_core::traits::Embedder`: a local
//! candle BERT model (MedEmbed and other BGE-style checkpoints) and a
//! deterministic hashing encoder for tests and offline dry runs.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use cardlink_core::config::EmbeddingConfig;
pub use cardlink_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::{masked_mean_l2, Pooling};

pub const FAKE_EMBEDDING_DIM: usize = 1024;

pub struct EmbeddingModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pooling: Pooling,
    max_len: usize,
    pad_id: u32,
    dim: usize,
    id: String,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, model_name: &str, max_len: usize, pooling: Pooling) -> Result<Self> {
        let device = device::select_device();
        info!(model = model_name, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let max_len = max_len.min(config.max_position_embeddings);

        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        let id = format!("candle:{}:{}:d{}", model_name, pooling.as_str(), dim);
        info!(embedder_id = %id, max_len, "embedding model ready");
        Ok(Self { model, tokenizer, device, pooling, max_len, pad_id, dim, id })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = self.pooling.apply(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "encoded batch");
        Ok(vectors)
    }
}

impl Embedder for EmbeddingModel {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_chunk(texts)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let path = weights_file(model_dir);
    debug!(path = %path.display(), "loading weights");
    let weights: HashMap<String, Tensor> = if path.extension().is_some_and(|e| e == "safetensors") {
        candle_core::safetensors::load(&path, device).with_context(|| format!("reading {}", path.display()))?
    } else {
        candle_core::pickle::read_all(&path)
            .with_context(|| format!("reading {}", path.display()))?
            .into_iter()
            .collect()
    };
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}

/// `model.safetensors` when present, else `pytorch_model.bin`.
fn weights_file(model_dir: &Path) -> PathBuf {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        safetensors
    } else {
        model_dir.join("pytorch_model.bin")
    }
}

/// Bag-of-tokens hashing encoder.
///
/// Texts sharing (case- and punctuation-insensitive) words get positive
/// cosine similarity; identical texts get identical unit vectors.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:xxhash64:d{}", dim) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token: String = token.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fake_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Builds the encoder described by `cfg`; `APP_USE_FAKE_EMBEDDINGS=1`
/// forces the hashing encoder.
pub fn get_default_embedder(cfg: &EmbeddingConfig, base_dir: &Path) -> Result<Box<dyn Embedder>> {
    if cfg.fake || fake_requested() {
        warn!("using FakeEmbedder; similarity scores are not semantic");
        return Ok(Box::new(FakeEmbedder::new(FAKE_EMBEDDING_DIM)));
    }
    let pooling = Pooling::parse(&cfg.pooling)?;
    let model_dir = resolve_model_dir(&cfg.model_dir, base_dir)?;
    Ok(Box::new(EmbeddingModel::load(&model_dir, &cfg.model_name, cfg.max_len, pooling)?))
}

fn resolve_model_dir(configured: &str, base_dir: &Path) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() {
            return Ok(p);
        }
        warn!(dir = %p.display(), "APP_MODEL_DIR does not exist; falling back to config");
    }
    let p = cardlink_core::config::resolve_with_base(base_dir, configured);
    if p.exists() {
        return Ok(p);
    }
    Err(anyhow!("Could not locate embedding model directory {}", p.display()))
}
