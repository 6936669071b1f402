use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use ragpdf_core::config::EmbeddingSettings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Embedder;

pub mod device;
pub mod hash;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;
pub use tokenize::{tokenize_batch, TokenBatch};

const BERT_PAD_ID: u32 = 0;

/// Sentence-transformers style BERT encoder loaded from a local checkpoint
/// directory (`config.json`, `tokenizer.json`, and `model.safetensors` or
/// `pytorch_model.bin`). Output is mean-pooled and L2-normalized.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_length: usize,
}

impl BertEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let model_dir = resolve_model_dir(settings)?;
        Self::from_dir(&model_dir, &settings.model_name, settings.max_length)
            .map_err(|e| Error::EmbeddingUnavailable(format!("{}: {:#}", model_dir.display(), e)))
    }

    pub fn from_dir(model_dir: &Path, model_id: &str, max_length: usize) -> anyhow::Result<Self> {
        let device = select_device();
        tracing::info!(model = model_id, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        tracing::info!(model = model_id, dim, "embedding model ready");

        Ok(Self { model, tokenizer, device, model_id: model_id.to_string(), dim, max_length })
    }

    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let batch = tokenize_batch(&self.tokenizer, texts, self.max_length, BERT_PAD_ID, &self.device)?;
        let hidden = self
            .model
            .forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }
}

impl Embedder for BertEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.encode(texts).map_err(|e| Error::EmbeddingUnavailable(format!("{:#}", e)))
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pytorch = model_dir.join("pytorch_model.bin");
    if pytorch.exists() {
        let weights = candle_core::pickle::read_all(&pytorch)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// The configured embedder, or the deterministic [`HashEmbedder`] when
/// `APP_USE_FAKE_EMBEDDINGS` is set.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        tracing::warn!("APP_USE_FAKE_EMBEDDINGS set, using hash embedder");
        return Ok(Box::new(HashEmbedder::default()));
    }
    Ok(Box::new(BertEmbedder::new(settings)?))
}

/// Locate the checkpoint directory: `embedding.model_dir`, then
/// `APP_MODEL_DIR`, `MODEL_DIR`, then `models/<last path segment of the model name>`.
pub fn resolve_model_dir(settings: &EmbeddingSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        let p = ragpdf_core::config::expand_path(dir);
        if p.is_dir() {
            return Ok(p);
        }
        return Err(Error::EmbeddingUnavailable(format!("embedding.model_dir {} does not exist", p.display())));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.is_dir() {
                tracing::debug!(var, dir = %p.display(), "model dir from environment");
                return Ok(p);
            }
        }
    }
    let short = settings.model_name.rsplit('/').next().unwrap_or(&settings.model_name);
    let local = Path::new("models").join(short);
    if local.is_dir() {
        return Ok(local);
    }
    Err(Error::EmbeddingUnavailable(format!(
        "could not locate model '{}': set embedding.model_dir or APP_MODEL_DIR, or place it under {}",
        settings.model_name,
        local.display()
    )))
}
