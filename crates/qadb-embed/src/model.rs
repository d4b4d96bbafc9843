//! Local sentence-transformer (BERT family, e.g. all-MiniLM-L6-v2) on candle.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use qadb_core::{Embedder, Embedding, EmbedError};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    pad_id: u32,
}

impl SentenceEmbedder {
    /// Load tokenizer, config and weights from `model_dir`.
    pub fn load(model_dir: &Path, model_id: &str, max_len: usize, batch_size: usize) -> Result<Self> {
        let started = Instant::now();
        let device = select_device();
        info!(model = model_id, dir = %model_dir.display(), "loading embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = config.hidden_size;
        let max_len = max_len.min(config.max_position_embeddings);
        let vb = load_weights(model_dir, &device)?;
        let model = BertModel::load(vb, &config)?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
        info!(model = model_id, dim, max_len, elapsed_ms = started.elapsed().as_millis() as u64, "embedding model loaded");
        Ok(Self { model, tokenizer, device, model_id: model_id.to_string(), dim, max_len, batch_size: batch_size.max(1), pad_id })
    }

    fn forward(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        Ok(rows)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights_map: std::collections::HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let weights_path = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&weights_path)?.into_iter().collect()
    };
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl Embedder for SentenceEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_many(&self, texts: &[String]) -> std::result::Result<Vec<Embedding>, EmbedError> {
        let started = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let rows = self.forward(chunk).map_err(|e| EmbedError::Inference(e.to_string()))?;
            if rows.len() != chunk.len() {
                return Err(EmbedError::BatchShape { expected: chunk.len(), got: rows.len() });
            }
            out.extend(rows);
        }
        let elapsed = started.elapsed();
        if texts.len() == 1 && elapsed.as_millis() > 100 { warn!(elapsed_ms = elapsed.as_millis() as u64, "slow embedding"); }
        debug!(texts = texts.len(), elapsed_ms = elapsed.as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Locate the model directory: explicit setting, then `APP_MODEL_DIR`,
/// `MODEL_DIR`, then `models/<model name>` relative to the working directory
/// and its parent.
pub fn resolve_model_dir(configured: Option<&Path>, model_id: &str) -> Result<PathBuf> {
    if let Some(p) = configured { if p.exists() { return Ok(p.to_path_buf()); } warn!(dir = %p.display(), "configured model_dir does not exist"); }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { debug!(var, dir = %p.display(), "using model dir from env"); return Ok(p); } }
    }
    let name = model_id.rsplit('/').next().unwrap_or(model_id);
    for root in [Path::new("models"), Path::new("../models")] {
        let p = root.join(name); if p.exists() { return Ok(p); }
    }
    Err(anyhow!("Could not locate model directory for {}", model_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn loads_safetensors_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        let w = Tensor::new(&[[1f32, 2.], [3., 4.]], &Device::Cpu).unwrap();
        let tensors: HashMap<String, Tensor> = [("dense.weight".to_string(), w)].into_iter().collect();
        candle_core::safetensors::save(&tensors, dir.path().join("model.safetensors")).unwrap();

        let vb = load_weights(dir.path(), &Device::Cpu).unwrap();
        let back = vb.get((2, 2), "dense.weight").unwrap();
        assert_eq!(back.to_vec2::<f32>().unwrap(), vec![vec![1., 2.], vec![3., 4.]]);
    }

    #[test]
    fn missing_weights_are_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_weights(dir.path(), &Device::Cpu).is_err());
    }
}
