//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! [thresholds]
//! similarity = 0.72
//! model = 0.6
//!
//! [retrieval]
//! top_k = 10
//!
//! [cache]
//! ttl_secs = 600
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub thresholds: Thresholds,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub lifecycle: LifecycleConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding dimension shared by the embedder and the precedent store.
    pub dim: usize,
    /// Inputs longer than this many characters are rejected.
    pub max_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: 384,
            max_chars: 2000,
        }
    }
}

/// Tier acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum top similarity score for a similarity match (`T_sim`).
    pub similarity: f32,
    /// Minimum score for a result to vote on the similarity grade.
    pub inclusion: f32,
    /// Minimum top class probability for a model prediction (`T_model`).
    pub model: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            similarity: 0.72,
            inclusion: 0.5,
            model: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Stores with at most this many precedents are scanned exactly.
    pub exact_scan_limit: usize,
    pub hnsw_max_connections: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Approximate candidates fetched per requested result before exact re-scoring.
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            exact_scan_limit: 10_000,
            hnsw_max_connections: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            candidate_multiplier: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Upper bound on the rendered context handed to the summarizer.
    pub max_chars: usize,
    pub summarizer_timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            summarizer_timeout_secs: 30,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Requests still processing after this long fail with a timeout.
    pub soft_deadline_secs: u64,
    pub history_limit: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            soft_deadline_secs: 120,
            history_limit: 20,
        }
    }
}

/// Precedent-search result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1024,
            ttl_secs: 3600,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("similarity", t.similarity),
            ("inclusion", t.inclusion),
            ("model", t.model),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if t.inclusion > t.similarity {
            return Err(ConfigError::Invalid(format!(
                "thresholds.inclusion ({}) must not exceed thresholds.similarity ({})",
                t.inclusion, t.similarity
            )));
        }
        if self.embedding.dim == 0 {
            return Err(ConfigError::Invalid("embedding.dim must be positive".into()));
        }
        if self.embedding.max_chars == 0 {
            return Err(ConfigError::Invalid(
                "embedding.max_chars must be positive".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be positive".into()));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.candidate_multiplier must be positive".into(),
            ));
        }
        if self.context.summarizer_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "context.summarizer_timeout_secs must be positive".into(),
            ));
        }
        if self.cache.enabled && (self.cache.max_entries == 0 || self.cache.ttl_secs == 0) {
            return Err(ConfigError::Invalid(
                "cache.max_entries and cache.ttl_secs must be positive when the cache is enabled"
                    .into(),
            ));
        }
        Ok(())
    }
}
