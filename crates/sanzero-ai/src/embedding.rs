//! Text embedding: the [`TextEmbedder`] seam plus a deterministic
//! feature-hashing implementation that needs no model files.

use async_trait::async_trait;
use sanzero_core::vector::normalize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot embed empty text")]
    Empty,
    #[error("text too long: {len} characters (max {max})")]
    TooLong { len: usize, max: usize },
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

impl EmbedError {
    /// Whether the input itself was at fault, as opposed to the backend.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Empty | Self::TooLong { .. })
    }
}

/// Turns case text into a fixed-length, L2-normalised vector.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Shared input checks for every embedder.
pub fn check_input(text: &str, max_chars: usize) -> Result<&str, EmbedError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbedError::Empty);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(EmbedError::TooLong { len, max: max_chars });
    }
    Ok(trimmed)
}

// ── Feature hashing ──

/// Signed feature hashing over lowercase word unigrams and bigrams.
///
/// Each feature is hashed with BLAKE3; the first eight bytes pick the slot and
/// the sign. Texts sharing vocabulary land close together under cosine.
pub struct HashingEmbedder {
    dim: usize,
    max_chars: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize, max_chars: usize) -> Self {
        Self {
            dim: dim.max(1),
            max_chars,
        }
    }

    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let text = check_input(text, self.max_chars)?;
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbedError::Empty);
        }

        let mut v = vec![0.0f32; self.dim];
        for token in &tokens {
            self.accumulate(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        normalize(&mut v);
        Ok(v)
    }

    fn accumulate(&self, v: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[..8]);
        let h = u64::from_le_bytes(word);
        let slot = (h % self.dim as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        v[slot] += sign * weight;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl TextEmbedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_sync(text)
    }
}
