//! Tier decision policy.
//!
//! [`decide`] is a pure function over the evidence gathered so far. It either
//! names the next tier whose evidence is needed or returns the final outcome,
//! so the cascade order lives here and nowhere else:
//!
//! 1. exact match → confidence 1.0
//! 2. top similarity score ≥ `similarity` → majority grade of the included results
//! 3. top class probability ≥ `model` → most likely grade
//! 4. no result

use std::collections::HashMap;

use sanzero_core::{
    DisabilityGrade, GradeDistribution, GradeProbability, SimilarityResult, Thresholds, Tier,
};
use sanzero_store::ExactMatch;

/// State of one tier's evidence.
#[derive(Debug, Clone)]
pub enum Observation<T> {
    /// Not gathered yet.
    Pending,
    /// The tier could not run.
    Unavailable(String),
    Observed(T),
}

impl<T> Default for Observation<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> Observation<T> {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn observed(&self) -> Option<&T> {
        match self {
            Self::Observed(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub exact: Observation<Option<ExactMatch>>,
    /// Results in canonical rank order.
    pub similarity: Observation<Vec<SimilarityResult>>,
    pub model: Observation<GradeDistribution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoResultReason {
    /// Tiers ran but none cleared its threshold.
    BelowThresholds,
    /// Neither the similarity tier nor the model tier could run.
    AllTiersUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    ExactMatch {
        grade: DisabilityGrade,
        reference: String,
    },
    SimilarityMatch {
        grade: DisabilityGrade,
        confidence: f32,
        /// Results that voted on the grade.
        voters: usize,
    },
    ModelPrediction {
        grade: DisabilityGrade,
        confidence: f32,
        top: Vec<GradeProbability>,
    },
    NoResult {
        reason: NoResultReason,
    },
}

impl TierOutcome {
    pub fn tier(&self) -> Tier {
        match self {
            Self::ExactMatch { .. } => Tier::Exact,
            Self::SimilarityMatch { .. } => Tier::Similarity,
            Self::ModelPrediction { .. } => Tier::Model,
            Self::NoResult { .. } => Tier::None,
        }
    }

    pub fn grade(&self) -> Option<DisabilityGrade> {
        match self {
            Self::ExactMatch { grade, .. }
            | Self::SimilarityMatch { grade, .. }
            | Self::ModelPrediction { grade, .. } => Some(*grade),
            Self::NoResult { .. } => None,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::ExactMatch { .. } => 1.0,
            Self::SimilarityMatch { confidence, .. } | Self::ModelPrediction { confidence, .. } => {
                *confidence
            }
            Self::NoResult { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    NeedExact,
    NeedSimilarity,
    NeedModel,
    Decided(TierOutcome),
}

pub fn decide(evidence: &Evidence, thresholds: &Thresholds) -> Step {
    match &evidence.exact {
        Observation::Pending => return Step::NeedExact,
        Observation::Observed(Some(hit)) => {
            return Step::Decided(TierOutcome::ExactMatch {
                grade: hit.grade,
                reference: hit.reference.clone(),
            });
        }
        Observation::Observed(None) | Observation::Unavailable(_) => {}
    }

    match &evidence.similarity {
        Observation::Pending => return Step::NeedSimilarity,
        Observation::Observed(results) => {
            if let Some(top) = results.first()
                && top.score >= thresholds.similarity
            {
                let (grade, voters) = majority_grade(results, thresholds.inclusion);
                return Step::Decided(TierOutcome::SimilarityMatch {
                    grade,
                    confidence: top.score.clamp(0.0, 1.0),
                    voters,
                });
            }
        }
        Observation::Unavailable(_) => {}
    }

    match &evidence.model {
        Observation::Pending => return Step::NeedModel,
        Observation::Observed(dist) => {
            let top = dist.top();
            if top.probability >= thresholds.model {
                return Step::Decided(TierOutcome::ModelPrediction {
                    grade: top.grade,
                    confidence: top.probability.clamp(0.0, 1.0),
                    top: dist.top_n(3),
                });
            }
        }
        Observation::Unavailable(_) => {}
    }

    let reason = if evidence.similarity.is_unavailable() && evidence.model.is_unavailable() {
        NoResultReason::AllTiersUnavailable
    } else {
        NoResultReason::BelowThresholds
    };
    Step::Decided(TierOutcome::NoResult { reason })
}

/// Most common grade among results scoring at least `inclusion`.
///
/// Ties go to the larger summed score, then to the grade of the best-ranked
/// member. `results` must be non-empty and in rank order.
fn majority_grade(results: &[SimilarityResult], inclusion: f32) -> (DisabilityGrade, usize) {
    struct Tally {
        count: usize,
        score_sum: f32,
        best_rank: usize,
    }

    let mut tallies: HashMap<DisabilityGrade, Tally> = HashMap::new();
    let mut voters = 0;
    for (rank, r) in results.iter().enumerate() {
        if r.score < inclusion {
            continue;
        }
        voters += 1;
        let t = tallies.entry(r.grade()).or_insert(Tally {
            count: 0,
            score_sum: 0.0,
            best_rank: rank,
        });
        t.count += 1;
        t.score_sum += r.score;
    }

    let winner = tallies.into_iter().max_by(|(_, a), (_, b)| {
        a.count
            .cmp(&b.count)
            .then(
                a.score_sum
                    .partial_cmp(&b.score_sum)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(b.best_rank.cmp(&a.best_rank))
    });

    match winner {
        Some((grade, _)) => (grade, voters),
        // Inclusion above the top score: fall back to the top result alone.
        None => (results[0].grade(), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanzero_core::{CaseKey, InjuryType, Precedent, PrecedentMetadata, Severity};
    use std::sync::Arc;

    fn grade(g: u8) -> DisabilityGrade {
        DisabilityGrade::new(g).unwrap()
    }

    fn result(case_number: &str, score: f32, g: u8) -> SimilarityResult {
        SimilarityResult {
            precedent: Arc::new(Precedent {
                case_number: case_number.into(),
                embedding: vec![1.0, 0.0, 0.0, 0.0],
                grade: grade(g),
                metadata: PrecedentMetadata::default(),
                quality_score: 0.5,
            }),
            score,
        }
    }

    fn exact_hit(g: u8) -> ExactMatch {
        ExactMatch {
            key: CaseKey::new(InjuryType::Amputation, Severity::Severe, "8-3").unwrap(),
            grade: grade(g),
            reference: "Table 6".into(),
        }
    }

    fn peaked(g: u8, p: f32) -> GradeDistribution {
        let rest = (1.0 - p) / 13.0;
        let probs = (1..=14).map(|i| if i == g { p } else { rest }).collect();
        GradeDistribution::new(probs).unwrap()
    }

    fn no_exact() -> Evidence {
        Evidence {
            exact: Observation::Observed(None),
            ..Default::default()
        }
    }

    #[test]
    fn cascade_requests_tiers_in_order() {
        let th = Thresholds::default();
        let mut ev = Evidence::default();
        assert_eq!(decide(&ev, &th), Step::NeedExact);
        ev.exact = Observation::Observed(None);
        assert_eq!(decide(&ev, &th), Step::NeedSimilarity);
        ev.similarity = Observation::Observed(vec![result("a", 0.3, 8)]);
        assert_eq!(decide(&ev, &th), Step::NeedModel);
    }

    #[test]
    fn exact_match_wins_without_other_evidence() {
        let ev = Evidence {
            exact: Observation::Observed(Some(exact_hit(4))),
            ..Default::default()
        };
        let Step::Decided(outcome) = decide(&ev, &Thresholds::default()) else {
            panic!("exact hit should decide immediately");
        };
        assert_eq!(outcome.tier(), Tier::Exact);
        assert_eq!(outcome.grade(), Some(grade(4)));
        assert_eq!(outcome.confidence(), 1.0);
    }

    #[test]
    fn similarity_scenario_majority_grade() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![
            result("e1", 0.81, 8),
            result("e2", 0.648, 8),
            result("e3", 0.567, 9),
        ]);
        assert_eq!(
            decide(&ev, &Thresholds::default()),
            Step::Decided(TierOutcome::SimilarityMatch {
                grade: grade(8),
                confidence: 0.81,
                voters: 3,
            })
        );
    }

    #[test]
    fn results_below_inclusion_do_not_vote() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![
            result("a", 0.9, 5),
            result("b", 0.45, 7),
            result("c", 0.44, 7),
        ]);
        let Step::Decided(TierOutcome::SimilarityMatch { grade: g, voters, .. }) =
            decide(&ev, &Thresholds::default())
        else {
            panic!("expected similarity match");
        };
        assert_eq!(g, grade(5));
        assert_eq!(voters, 1);
    }

    #[test]
    fn majority_ties_break_on_summed_score_then_rank() {
        let results = vec![
            result("a", 0.9, 3),
            result("b", 0.85, 6),
            result("c", 0.8, 6),
            result("d", 0.6, 3),
        ];
        // 3: 1.5, 6: 1.65
        assert_eq!(majority_grade(&results, 0.5).0, grade(6));

        let results = vec![result("a", 0.8, 3), result("b", 0.8, 6)];
        assert_eq!(majority_grade(&results, 0.5).0, grade(3));
    }

    #[test]
    fn below_similarity_threshold_falls_to_model() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![result("a", 0.71, 8)]);
        ev.model = Observation::Observed(peaked(11, 0.7));
        let Step::Decided(outcome) = decide(&ev, &Thresholds::default()) else {
            panic!("expected a decision");
        };
        assert_eq!(outcome.tier(), Tier::Model);
        assert_eq!(outcome.grade(), Some(grade(11)));
        let TierOutcome::ModelPrediction { top, .. } = outcome else {
            unreachable!()
        };
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].grade, grade(11));
    }

    #[test]
    fn weak_model_gives_no_result() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![]);
        ev.model = Observation::Observed(peaked(11, 0.3));
        assert_eq!(
            decide(&ev, &Thresholds::default()),
            Step::Decided(TierOutcome::NoResult {
                reason: NoResultReason::BelowThresholds
            })
        );
    }

    #[test]
    fn unavailable_similarity_cascades_to_model() {
        let mut ev = no_exact();
        ev.similarity = Observation::Unavailable("embedder down".into());
        assert_eq!(decide(&ev, &Thresholds::default()), Step::NeedModel);
        ev.model = Observation::Observed(peaked(2, 0.9));
        let Step::Decided(outcome) = decide(&ev, &Thresholds::default()) else {
            panic!("expected a decision");
        };
        assert_eq!(outcome.tier(), Tier::Model);
    }

    #[test]
    fn all_unavailable_is_reported() {
        let mut ev = no_exact();
        ev.similarity = Observation::Unavailable("index down".into());
        ev.model = Observation::Unavailable("no classifier".into());
        assert_eq!(
            decide(&ev, &Thresholds::default()),
            Step::Decided(TierOutcome::NoResult {
                reason: NoResultReason::AllTiersUnavailable
            })
        );
    }

    #[test]
    fn empty_store_without_classifier_is_below_thresholds() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![]);
        ev.model = Observation::Unavailable("no classifier".into());
        assert_eq!(
            decide(&ev, &Thresholds::default()),
            Step::Decided(TierOutcome::NoResult {
                reason: NoResultReason::BelowThresholds
            })
        );
    }

    #[test]
    fn configured_thresholds_apply() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![result("a", 0.65, 8)]);
        let lenient = Thresholds {
            similarity: 0.6,
            ..Thresholds::default()
        };
        let Step::Decided(outcome) = decide(&ev, &lenient) else {
            panic!("expected a decision");
        };
        assert_eq!(outcome.tier(), Tier::Similarity);
    }

    #[test]
    fn confidence_clamped() {
        let mut ev = no_exact();
        ev.similarity = Observation::Observed(vec![result("a", 1.000_002, 8)]);
        let Step::Decided(outcome) = decide(&ev, &Thresholds::default()) else {
            panic!("expected a decision");
        };
        assert_eq!(outcome.confidence(), 1.0);
    }
}
