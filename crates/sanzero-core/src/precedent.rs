//! Precedent records and similarity results.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::grade::DisabilityGrade;

/// Descriptive fields of a precedent, carried into citations and context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecedentMetadata {
    pub title: String,
    pub summary: String,
    pub court: Option<String>,
    /// ISO 8601 date string.
    pub decided_on: Option<String>,
    pub outcome: Option<String>,
    /// Awarded compensation in KRW, when reported.
    pub compensation_amount: Option<u64>,
    pub injury_type: Option<String>,
    pub industry_code: Option<String>,
}

/// An immutable precedent with its embedding.
///
/// Produced by ingestion; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precedent {
    /// Globally unique court case number, e.g. `2019누12345`.
    pub case_number: String,
    pub embedding: Vec<f32>,
    pub grade: DisabilityGrade,
    pub metadata: PrecedentMetadata,
    /// Curation quality in `[0, 1]`; breaks similarity ties.
    pub quality_score: f32,
}

/// A precedent paired with its similarity to a query.
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub precedent: Arc<Precedent>,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

impl SimilarityResult {
    pub fn case_number(&self) -> &str {
        &self.precedent.case_number
    }

    pub fn grade(&self) -> DisabilityGrade {
        self.precedent.grade
    }
}

/// Canonical result ordering: score descending, then higher quality score,
/// then lexicographically smaller case number.
pub fn rank_order(a: &SimilarityResult, b: &SimilarityResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.precedent
                .quality_score
                .partial_cmp(&a.precedent.quality_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.precedent.case_number.cmp(&b.precedent.case_number))
}
