//! AI inference layer: case embeddings, grade classification, and LLM summaries.

mod embedding;
pub use embedding::{EmbedError, HashingEmbedder, TextEmbedder, check_input};

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;

mod classifier;
pub use classifier::{
    GradeClassifier, GradeWeights, InferenceError, WeightedGradeModel, validate_features,
};

mod summarizer;
pub use summarizer::{DisabledSummarizer, SummarizeError, Summarizer, SummaryRequest};

#[cfg(feature = "http")]
mod anthropic;
#[cfg(feature = "http")]
pub use anthropic::AnthropicSummarizer;
