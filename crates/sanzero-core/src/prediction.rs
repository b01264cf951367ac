//! Analysis outputs: grade predictions, citations, and summaries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::compensation::CompensationEstimate;
use crate::grade::{DisabilityGrade, GradeProbability};
use crate::precedent::SimilarityResult;

/// Which tier produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Exact,
    Similarity,
    Model,
    None,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Similarity => "similarity",
            Self::Model => "model",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative accuracy band for a confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyLevel {
    High,
    Medium,
    Low,
    Insufficient,
}

impl AccuracyLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.7 {
            Self::High
        } else if confidence >= 0.5 {
            Self::Medium
        } else if confidence >= 0.3 {
            Self::Low
        } else {
            Self::Insufficient
        }
    }
}

/// A grade prediction and the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// `None` only when `tier_used` is [`Tier::None`].
    pub grade: Option<DisabilityGrade>,
    /// In `[0, 1]`; exact matches are always `1.0`.
    pub confidence: f32,
    pub tier_used: Tier,
    /// Case numbers in rank order.
    pub supporting_precedents: Vec<String>,
    /// Top grade probabilities, model tier only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_predictions: Vec<GradeProbability>,
    pub explanation: String,
}

impl PredictionResult {
    pub fn accuracy(&self) -> AccuracyLevel {
        AccuracyLevel::from_confidence(self.confidence)
    }
}

/// A precedent cited in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub case_number: String,
    pub score: f32,
    pub grade: DisabilityGrade,
    pub title: String,
    pub court: Option<String>,
    pub decided_on: Option<String>,
}

impl From<&SimilarityResult> for Citation {
    fn from(r: &SimilarityResult) -> Self {
        let p = &r.precedent;
        Self {
            case_number: p.case_number.clone(),
            score: r.score,
            grade: p.grade,
            title: p.metadata.title.clone(),
            court: p.metadata.court.clone(),
            decided_on: p.metadata.decided_on.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    /// Produced by the external summarizer.
    Generated,
    /// Rendered from structured fields after the summarizer failed or timed out.
    Templated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

/// Final payload of a completed analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub prediction: Option<PredictionResult>,
    pub citations: Vec<Citation>,
    pub summary: Option<Summary>,
    pub compensation: Option<CompensationEstimate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_bands() {
        assert_eq!(AccuracyLevel::from_confidence(1.0), AccuracyLevel::High);
        assert_eq!(AccuracyLevel::from_confidence(0.7), AccuracyLevel::High);
        assert_eq!(AccuracyLevel::from_confidence(0.55), AccuracyLevel::Medium);
        assert_eq!(AccuracyLevel::from_confidence(0.3), AccuracyLevel::Low);
        assert_eq!(AccuracyLevel::from_confidence(0.1), AccuracyLevel::Insufficient);
    }

    #[test]
    fn tier_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Tier::Similarity).unwrap(), "\"similarity\"");
    }

    #[test]
    fn model_only_fields_are_omitted() {
        let p = PredictionResult {
            grade: None,
            confidence: 0.0,
            tier_used: Tier::None,
            supporting_precedents: vec![],
            top_predictions: vec![],
            explanation: "no tier cleared its threshold".into(),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("top_predictions").is_none());
        assert!(json["grade"].is_null());
    }
}
