//! Disability grades and grade probability distributions.
//!
//! Grades follow the statutory scale: grade 1 is the most severe residual
//! disability, grade 14 the least.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of statutory disability grades.
pub const GRADE_COUNT: usize = 14;

/// Tolerance used when checking that a distribution sums to one.
pub const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

/// A statutory disability grade in `1..=14`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DisabilityGrade(u8);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("grade {0} is outside 1..={GRADE_COUNT}")]
    GradeOutOfRange(i64),

    #[error("expected {GRADE_COUNT} probabilities, got {0}")]
    WrongLength(usize),

    #[error("probability for grade {grade} is invalid: {value}")]
    InvalidProbability { grade: usize, value: f32 },

    #[error("probabilities sum to {0}, expected 1")]
    NotNormalized(f32),
}

impl DisabilityGrade {
    pub const MOST_SEVERE: Self = Self(1);
    pub const LEAST_SEVERE: Self = Self(GRADE_COUNT as u8);

    pub fn new(grade: u8) -> Result<Self, DistributionError> {
        if (1..=GRADE_COUNT as u8).contains(&grade) {
            Ok(Self(grade))
        } else {
            Err(DistributionError::GradeOutOfRange(grade as i64))
        }
    }

    /// Grade for a zero-based distribution index.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < GRADE_COUNT).then(|| Self(index as u8 + 1))
    }

    /// Round and clamp a continuous severity score onto the grade scale.
    pub fn clamped(score: f32) -> Self {
        let rounded = score.round().clamp(1.0, GRADE_COUNT as f32);
        Self(rounded as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Grades paid as an annual pension rather than a lump sum.
    pub fn is_pension_grade(self) -> bool {
        self.0 <= 3
    }

    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "total loss of function requiring constant care",
            2 => "severe loss of function requiring frequent care",
            3 => "severe loss of function, unable to work for life",
            4 => "loss of major limb function or both hands' use",
            5 => "loss of one major limb below the main joint",
            6 => "serious impairment of a major limb or the spine",
            7 => "marked impairment with restricted working capacity",
            8 => "significant impairment of a limb or the spine",
            9 => "moderate impairment restricting some work",
            10 => "partial loss of function of a limb or organ",
            11 => "moderate residual impairment",
            12 => "persistent localized symptoms or deformity",
            13 => "minor loss of function or partial loss of a digit",
            _ => "minimal residual impairment",
        }
    }
}

impl TryFrom<u8> for DisabilityGrade {
    type Error = DistributionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DisabilityGrade> for u8 {
    fn from(grade: DisabilityGrade) -> u8 {
        grade.0
    }
}

impl fmt::Display for DisabilityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grade {}", self.0)
    }
}

/// One entry of a grade distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeProbability {
    pub grade: DisabilityGrade,
    pub probability: f32,
}

/// Probability distribution over all disability grades.
///
/// Construction validates length, non-negativity, and normalization, so every
/// value of this type is a proper distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeDistribution {
    probs: Vec<f32>,
}

impl GradeDistribution {
    pub fn new(probs: Vec<f32>) -> Result<Self, DistributionError> {
        if probs.len() != GRADE_COUNT {
            return Err(DistributionError::WrongLength(probs.len()));
        }
        for (i, &p) in probs.iter().enumerate() {
            if !p.is_finite() || p < 0.0 {
                return Err(DistributionError::InvalidProbability {
                    grade: i + 1,
                    value: p,
                });
            }
        }
        let sum: f32 = probs.iter().sum();
        if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(DistributionError::NotNormalized(sum));
        }
        Ok(Self { probs })
    }

    /// Normalize non-negative weights into a distribution.
    pub fn from_weights(weights: Vec<f32>) -> Result<Self, DistributionError> {
        let sum: f32 = weights.iter().sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(DistributionError::NotNormalized(sum));
        }
        Self::new(weights.into_iter().map(|w| w / sum).collect())
    }

    pub fn probability(&self, grade: DisabilityGrade) -> f32 {
        self.probs[grade.index()]
    }

    /// Most likely grade. Ties resolve toward the more severe grade.
    pub fn top(&self) -> GradeProbability {
        let mut best = 0;
        for (i, &p) in self.probs.iter().enumerate() {
            if p > self.probs[best] {
                best = i;
            }
        }
        GradeProbability {
            grade: DisabilityGrade(best as u8 + 1),
            probability: self.probs[best],
        }
    }

    /// The `n` most likely grades in descending probability.
    pub fn top_n(&self, n: usize) -> Vec<GradeProbability> {
        let mut ranked: Vec<GradeProbability> = self
            .probs
            .iter()
            .enumerate()
            .map(|(i, &p)| GradeProbability {
                grade: DisabilityGrade(i as u8 + 1),
                probability: p,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.grade.cmp(&b.grade))
        });
        ranked.truncate(n);
        ranked
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.probs
    }
}
