//! # Sentence embeddings
//!
//! Text → fixed-dimension vector, using the all-MiniLM-L6-v2 BERT model via Candle
//! (pure Rust ML framework). Vectors are mean-pooled over the attention mask and
//! L2-normalized, so identical input always yields an identical 384-d vector.
//!
//! The rest of the crate only sees the [`Embedder`] trait, which keeps the model
//! out of tests and lets a different encoder slot in.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::info;

use crate::errors::BoxError;

/// Maps text to a fixed-dimension vector. Must be deterministic.
pub trait Embedder: Send + Sync {
    /// Length of every vector returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError>;
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl SentenceEmbeddingsModel {
    /// Load the model from the Hugging Face Hub, or from `model_dir` when given.
    ///
    /// Blocking: downloads (first run) and memory-maps the weights.
    pub fn load(model_id: &str, model_dir: Option<&Path>) -> Result<Self, BoxError> {
        let device = Device::Cpu;

        let (config_filename, tokenizer_filename, weights_filename) = match model_dir {
            Some(dir) => {
                info!("Loading embedding model from {}", dir.display());
                (
                    dir.join("config.json"),
                    dir.join("tokenizer.json"),
                    dir.join("model.safetensors"),
                )
            }
            None => {
                info!("Loading embedding model {} from Hugging Face", model_id);
                fetch_model_files(model_id)?
            }
        };

        let config = std::fs::read_to_string(config_filename)?;
        let dimension = serde_json::from_str::<serde_json::Value>(&config)?["hidden_size"]
            .as_u64()
            .ok_or("config.json has no hidden_size")? as usize;
        let config: Config = serde_json::from_str(&config)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| format!("Failed to load tokenizer: {}", e))?;

        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    /// Encode text into an embedding
    pub fn encode(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("Tokenization error: {}", e))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;

        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let embedding = normalize(&embedding)?;

        Ok(embedding.to_vec1::<f32>()?)
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> Result<Tensor, BoxError> {
        // embeddings: [1, seq_len, hidden]; mask needs [1, seq_len, 1] to broadcast
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }
}

impl Embedder for SentenceEmbeddingsModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, BoxError> {
        self.encode(text)
    }
}

fn fetch_model_files(model_id: &str) -> Result<(PathBuf, PathBuf, PathBuf), BoxError> {
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
    let api = Api::new()?;
    let api_repo = api.repo(repo);

    Ok((
        api_repo.get("config.json")?,
        api_repo.get("tokenizer.json")?,
        api_repo.get("model.safetensors")?,
    ))
}

/// L2 normalize the embedding vector
fn normalize(tensor: &Tensor) -> Result<Tensor, BoxError> {
    let norm = tensor.sqr()?.sum_all()?.sqrt()?;
    Ok(tensor.broadcast_div(&norm)?)
}
