//! Disability-grade classification from structured case features.
//!
//! The built-in model scores a case additively around a mid grade, then turns
//! the score into a discrete Gaussian over the fourteen grades. The spread
//! narrows as more feature slots are known, so sparse cases produce flat
//! distributions that rarely clear the model threshold.

use std::path::Path;

use async_trait::async_trait;
use sanzero_core::features::{self, FEATURE_LEN, SLOT_MAX};
use sanzero_core::{DistributionError, GRADE_COUNT, GradeDistribution};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("feature vector has {0} slots, expected {FEATURE_LEN}")]
    FeatureLength(usize),
    #[error("feature slot {0} is not finite")]
    NonFinite(usize),
    #[error("feature slot {index} has invalid code {value}")]
    OutOfRange { index: usize, value: f32 },
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("{0}")]
    Other(String),
}

/// Feature vector → grade distribution. Implementations have no side effects.
#[async_trait]
pub trait GradeClassifier: Send + Sync {
    async fn predict(&self, features: &[f32]) -> Result<GradeDistribution, InferenceError>;
}

/// Check a feature vector and return its integer codes.
pub fn validate_features(features: &[f32]) -> Result<[u8; FEATURE_LEN], InferenceError> {
    if features.len() != FEATURE_LEN {
        return Err(InferenceError::FeatureLength(features.len()));
    }
    let mut codes = [0u8; FEATURE_LEN];
    for (index, &value) in features.iter().enumerate() {
        if !value.is_finite() {
            return Err(InferenceError::NonFinite(index));
        }
        if value < 0.0 || value.fract() != 0.0 || value > f32::from(SLOT_MAX[index]) {
            return Err(InferenceError::OutOfRange { index, value });
        }
        codes[index] = value as u8;
    }
    Ok(codes)
}

// ── Weighted model ──

/// Per-code grade adjustments. Index `code - 1` of each table; unknown adds 0.
/// Negative moves toward grade 1 (more severe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeWeights {
    pub base: f32,
    pub injury_type: Vec<f32>,
    pub body_part: Vec<f32>,
    pub treatment_band: Vec<f32>,
    pub gender: Vec<f32>,
    pub age_band: Vec<f32>,
    pub industry_group: Vec<f32>,
    pub accident_type: Vec<f32>,
    pub severity: Vec<f32>,
    /// Spread at full coverage.
    pub min_sigma: f32,
    /// Extra spread added as coverage drops to zero.
    pub sigma_range: f32,
}

impl Default for GradeWeights {
    fn default() -> Self {
        Self {
            base: 8.0,
            // amputation, fracture, dislocation, sprain, contusion, abrasion
            injury_type: vec![-6.0, -4.0, -2.0, 0.0, 2.0, 4.0],
            // head, neck, chest, abdomen, arm, leg, hand, foot, spine
            body_part: vec![-4.0, -3.0, -2.0, -1.0, 0.0, 0.0, 2.0, 2.0, -3.0],
            treatment_band: vec![4.0, 2.0, 0.0, -2.0, -4.0, -6.0],
            gender: vec![0.0, 1.0],
            age_band: vec![2.0, 1.0, 0.0, 0.0, -1.0, -3.0],
            industry_group: vec![0.0, -1.0, -2.0, 0.0, 1.0, 1.0, 1.0, 0.0],
            // fall, collision, caught, cut, fire/explosion, traffic, machinery, other
            accident_type: vec![-1.0, 0.0, -1.0, -2.0, -3.0, -1.0, -1.0, 1.0],
            severity: vec![2.0, 0.0, -2.0, -4.0],
            min_sigma: 0.4,
            sigma_range: 1.6,
        }
    }
}

impl GradeWeights {
    fn table(&self, slot: usize) -> &[f32] {
        match slot {
            features::INJURY_TYPE => &self.injury_type,
            features::BODY_PART => &self.body_part,
            features::TREATMENT_BAND => &self.treatment_band,
            features::GENDER => &self.gender,
            features::AGE_BAND => &self.age_band,
            features::INDUSTRY_GROUP => &self.industry_group,
            features::ACCIDENT_TYPE => &self.accident_type,
            features::SEVERITY => &self.severity,
            _ => &[],
        }
    }

    fn validate(&self) -> Result<(), InferenceError> {
        if !(self.min_sigma > 0.0 && self.sigma_range >= 0.0) {
            return Err(InferenceError::Other(format!(
                "invalid spread: min_sigma {}, sigma_range {}",
                self.min_sigma, self.sigma_range
            )));
        }
        for slot in 0..FEATURE_LEN {
            let len = self.table(slot).len();
            if len != usize::from(SLOT_MAX[slot]) {
                return Err(InferenceError::Other(format!(
                    "weight table for slot {slot} has {len} entries, expected {}",
                    SLOT_MAX[slot]
                )));
            }
        }
        Ok(())
    }
}

pub struct WeightedGradeModel {
    weights: GradeWeights,
}

impl Default for WeightedGradeModel {
    fn default() -> Self {
        Self {
            weights: GradeWeights::default(),
        }
    }
}

impl WeightedGradeModel {
    pub fn new(weights: GradeWeights) -> Result<Self, InferenceError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Load weights from a JSON file. Missing fields fall back to the built-in tables.
    pub fn load_json(path: &Path) -> Result<Self, InferenceError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::Other(format!("read {}: {e}", path.display())))?;
        let weights: GradeWeights = serde_json::from_str(&text)
            .map_err(|e| InferenceError::Other(format!("parse {}: {e}", path.display())))?;
        Self::new(weights)
    }

    /// Raw additive score, clamped to the grade range.
    pub fn score(&self, codes: &[u8; FEATURE_LEN]) -> f32 {
        let adjust: f32 = codes
            .iter()
            .enumerate()
            .filter(|&(_, &code)| code > 0)
            .filter_map(|(slot, &code)| self.weights.table(slot).get(usize::from(code) - 1))
            .sum();
        (self.weights.base + adjust).clamp(1.0, GRADE_COUNT as f32)
    }

    pub fn predict_sync(&self, features: &[f32]) -> Result<GradeDistribution, InferenceError> {
        let codes = validate_features(features)?;
        let center = self.score(&codes);
        let coverage = features::coverage(features);
        let sigma = self.weights.min_sigma + (1.0 - coverage) * self.weights.sigma_range;

        let weights: Vec<f32> = (1..=GRADE_COUNT)
            .map(|g| {
                let d = g as f32 - center;
                (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        debug!(center, coverage, sigma, "weighted grade score");
        Ok(GradeDistribution::from_weights(weights)?)
    }
}

#[async_trait]
impl GradeClassifier for WeightedGradeModel {
    async fn predict(&self, features: &[f32]) -> Result<GradeDistribution, InferenceError> {
        self.predict_sync(features)
    }
}
