//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_MATCHER__THRESHOLD=0.7`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against the config directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::segmenter::SegmenterConfig;

/// Most flashcards a single classifier request may carry.
pub const MAX_CLASSIFIER_BATCH: usize = 5;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Without `env_name` the overlay is picked by `RUST_ENV` (default `dev`).
    pub fn load_from(base_dir: &Path, env_name: Option<&str>) -> anyhow::Result<Self> {
        let env_name = match env_name {
            Some(e) => e.to_string(),
            None => env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string()),
        };

        let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: base_dir.to_path_buf() })
    }

    /// Extracts and validates the typed pipeline settings.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let mut cfg: PipelineConfig = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        cfg.base_dir = self.base_dir.clone();
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub segmenter: SegmenterConfig,
    pub index: IndexConfig,
    pub matcher: MatcherConfig,
    pub embedding: EmbeddingConfig,
    pub classifier: ClassifierConfig,
    pub run: RunConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            segmenter: SegmenterConfig::default(),
            index: IndexConfig::default(),
            matcher: MatcherConfig::default(),
            embedding: EmbeddingConfig::default(),
            classifier: ClassifierConfig::default(),
            run: RunConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    /// Resolves a configured path against the config directory.
    pub fn path<S: AsRef<str>>(&self, raw: S) -> PathBuf {
        resolve_with_base(&self.base_dir, raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.segmenter.max_paragraph_length == 0 {
            return Err(Error::InvalidConfig("segmenter.max_paragraph_length must be > 0".into()));
        }
        if self.index.batch_size == 0 {
            return Err(Error::InvalidConfig("index.batch_size must be > 0".into()));
        }
        if !(-1.0..=1.0).contains(&self.matcher.threshold) {
            return Err(Error::InvalidConfig(format!(
                "matcher.threshold must lie in [-1, 1], got {}",
                self.matcher.threshold
            )));
        }
        if self.matcher.top_k == 0 {
            return Err(Error::InvalidConfig("matcher.top_k must be > 0".into()));
        }
        if self.classifier.batch_size == 0 || self.classifier.batch_size > MAX_CLASSIFIER_BATCH {
            return Err(Error::InvalidConfig(format!(
                "classifier.batch_size must lie in 1..={}, got {}",
                MAX_CLASSIFIER_BATCH, self.classifier.batch_size
            )));
        }
        if self.run.max_attempts == 0 {
            return Err(Error::InvalidConfig("run.max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub catalog: String,
    pub flashcards: String,
    pub index: String,
    pub mapped_table: String,
    pub output_dir: String,
    pub checkpoint: String,
    pub final_output: String,
    pub merged_output: String,
    pub no_class_output: String,
    pub with_class_output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: "data/transcripts.json".into(),
            flashcards: "data/flashcards.csv".into(),
            index: "data/flashcard_index.json".into(),
            mapped_table: "output/flashcards_mapped.csv".into(),
            output_dir: "output/classified".into(),
            checkpoint: "output/progress_on_error.csv".into(),
            final_output: "output/classified_final.csv".into(),
            merged_output: "output/final_merged_output.csv".into(),
            no_class_output: "output/no_class.csv".into(),
            with_class_output: "output/with_class.csv".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold: f32,
    pub top_k: usize,
    /// Number of chunks per encoder call during the match stage.
    pub encode_batch_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { threshold: 0.65, top_k: 20, encode_batch_size: 32 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Local model directory (`config.json`, `tokenizer.json`, weights).
    pub model_dir: String,
    pub model_name: String,
    /// Every sequence is padded/truncated to this many tokens.
    pub max_len: usize,
    /// `cls` or `mean`.
    pub pooling: String,
    pub fake: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: "models/MedEmbed-large-v0.1".into(),
            model_name: "abhinand/MedEmbed-large-v0.1".into(),
            max_len: 512,
            pooling: "cls".into(),
            fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    /// Falls back to `ANTHROPIC_API_KEY` when unset.
    pub api_key: Option<String>,
    pub api_version: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            model: "claude-3-5-sonnet-20240620".into(),
            api_key: None,
            api_version: "2023-06-01".into(),
            max_tokens: 100,
            temperature: 0.0,
            batch_size: 5,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_attempts: usize,
    pub backoff_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { max_attempts: 10, backoff_secs: 600 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
