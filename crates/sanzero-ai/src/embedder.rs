//! ONNX Runtime sentence embedder for case descriptions.
//!
//! Mean-pooled sentence-transformers output (all-MiniLM-L6-v2, 384 dimensions
//! by default). The model directory must contain `model.onnx` and
//! `tokenizer.json`. Inference runs on the blocking pool behind a mutex since
//! an ORT session needs exclusive access per run.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use sanzero_core::vector::normalize;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::embedding::{EmbedError, TextEmbedder, check_input};

/// Token limit of MiniLM-family models.
const MAX_TOKENS: usize = 256;

struct Model {
    session: Session,
    tokenizer: Tokenizer,
}

pub struct OnnxEmbedder {
    model: Arc<Mutex<Model>>,
    dim: usize,
    max_chars: usize,
}

impl OnnxEmbedder {
    /// Load a model from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path, max_chars: usize) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(dim, model = %model_path.display(), "loaded case embedding model");
        Ok(Self {
            model: Arc::new(Mutex::new(Model { session, tokenizer })),
            dim,
            max_chars,
        })
    }

    /// Embed several texts in one session run. Used by bulk ingestion.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let texts: Vec<String> = texts
            .iter()
            .map(|t| check_input(t, self.max_chars).map(str::to_string))
            .collect::<Result<_, _>>()?;
        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbedError::Backend(format!("model lock poisoned: {e}")))?;
        run_batch(&mut model, texts, self.dim).map_err(|e| EmbedError::Backend(e.to_string()))
    }
}

#[async_trait]
impl TextEmbedder for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let text = check_input(text, self.max_chars)?.to_string();
        let model = Arc::clone(&self.model);
        let dim = self.dim;

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| EmbedError::Backend(format!("model lock poisoned: {e}")))?;
            run_batch(&mut model, vec![text], dim).map_err(|e| EmbedError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| EmbedError::Backend(format!("embedding task failed: {e}")))??;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Backend("model returned no embedding".into()))
    }
}

fn run_batch(model: &mut Model, texts: Vec<String>, dim: usize) -> anyhow::Result<Vec<Vec<f32>>> {
    let batch_size = texts.len();
    let encodings = model
        .tokenizer
        .encode_batch(texts, true)
        .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    // Flat [batch_size, seq_len] inputs.
    let mut input_ids = vec![0i64; batch_size * seq_len];
    let mut attention_mask = vec![0i64; batch_size * seq_len];
    let mut token_type_ids = vec![0i64; batch_size * seq_len];
    for (i, encoding) in encodings.iter().enumerate() {
        let offset = i * seq_len;
        let rows = encoding
            .get_ids()
            .iter()
            .zip(encoding.get_attention_mask())
            .zip(encoding.get_type_ids());
        for (j, ((&id, &mask), &tid)) in rows.enumerate() {
            input_ids[offset + j] = id as i64;
            attention_mask[offset + j] = mask as i64;
            token_type_ids[offset + j] = tid as i64;
        }
    }

    let shape = [batch_size as i64, seq_len as i64];
    let outputs = model.session.run(ort::inputs![
        "input_ids" => Tensor::from_array((shape, input_ids.into_boxed_slice()))?,
        "attention_mask" => Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))?,
        "token_type_ids" => Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?,
    ])?;

    // Token embeddings: [batch_size, seq_len, dim].
    let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: &[i64] = output_shape;
    anyhow::ensure!(
        dims.len() == 3 && dims[0] as usize == batch_size && dims[2] as usize == dim,
        "unexpected output shape: {dims:?}, expected [{batch_size}, {seq_len}, {dim}]"
    );
    let out_seq_len = dims[1] as usize;

    let embeddings = (0..batch_size)
        .map(|i| {
            let mask = &attention_mask[i * seq_len..(i + 1) * seq_len];
            let tokens = &output_data[i * out_seq_len * dim..(i + 1) * out_seq_len * dim];
            mean_pool(tokens, mask, dim)
        })
        .collect::<Vec<_>>();
    debug!(batch_size, seq_len, "embedded batch");
    Ok(embeddings)
}

/// Attention-masked mean over token vectors, L2-normalised.
fn mean_pool(tokens: &[f32], mask: &[i64], dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for (token, &m) in tokens.chunks_exact(dim).zip(mask) {
        if m > 0 {
            for (p, &x) in pooled.iter_mut().zip(token) {
                *p += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        for p in &mut pooled {
            *p /= count;
        }
    }
    normalize(&mut pooled);
    pooled
}

/// Embedding dimension from the model's output shape, if static.
fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanzero_core::vector::cosine_similarity;
    use std::path::PathBuf;

    fn model_dir() -> Option<PathBuf> {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("all-MiniLM-L6-v2");
        if dir.join("model.onnx").exists() {
            Some(dir)
        } else {
            eprintln!("skipping: model not found at {}", dir.display());
            None
        }
    }

    #[test]
    fn mean_pool_ignores_padding() {
        let tokens = [1.0, 0.0, 0.0, 1.0, 9.0, 9.0];
        let pooled = mean_pool(&tokens, &[1, 1, 0], 2);
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((pooled[0] - expected).abs() < 1e-6);
        assert!((pooled[1] - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn similar_cases_closer() {
        let Some(dir) = model_dir() else { return };
        let embedder = OnnxEmbedder::load(&dir, 2000).unwrap();
        assert_eq!(embedder.dim(), 384);

        let fall = embedder.embed("worker fell from scaffolding").await.unwrap();
        let ladder = embedder.embed("employee fell off a ladder on site").await.unwrap();
        let burn = embedder.embed("chemical burn to the forearm").await.unwrap();
        assert!(cosine_similarity(&fall, &ladder) > cosine_similarity(&fall, &burn));
    }

    #[test]
    fn batch_matches_dimension() {
        let Some(dir) = model_dir() else { return };
        let embedder = OnnxEmbedder::load(&dir, 2000).unwrap();
        let vecs = embedder
            .embed_batch(&["finger amputation", "lumbar fracture", "knee sprain"])
            .unwrap();
        assert_eq!(vecs.len(), 3);
        assert!(vecs.iter().all(|v| v.len() == 384));
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }
}
