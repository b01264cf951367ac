//! One analysis, start to finish: tier cascade, citations, compensation, summary.

use std::sync::Arc;

use sanzero_core::compensation;
use sanzero_core::features;
use sanzero_core::{
    AnalysisResult, AnalysisType, Case, Citation, FailureKind, PredictionResult,
    SimilarityResult,
};
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, SearchCache};
use crate::context::ContextBuilder;
use crate::tier::{Evidence, NoResultReason, Observation, Step, TierOutcome, decide};
use crate::{AnalysisFailure, EngineError, ServiceContext};

/// Why the similarity tier could not run.
#[derive(Debug)]
enum RetrievalFailure {
    /// The embedder rejected the text itself.
    Input(String),
    Unavailable(String),
}

impl RetrievalFailure {
    fn message(&self) -> &str {
        match self {
            Self::Input(m) | Self::Unavailable(m) => m,
        }
    }

    fn into_failure(self) -> AnalysisFailure {
        match self {
            Self::Input(m) => AnalysisFailure::new(FailureKind::InvalidInput, m),
            Self::Unavailable(m) => AnalysisFailure::new(FailureKind::Unavailable, m),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    ctx: Arc<ServiceContext>,
    context: ContextBuilder,
    cache: Option<Arc<SearchCache>>,
}

impl Engine {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let context = ContextBuilder::from(&ctx.config.context);
        let cache = SearchCache::from_config(&ctx.config.cache).map(Arc::new);
        Self {
            ctx,
            context,
            cache,
        }
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// Search-cache counters, when the cache is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Top-`k` precedents for free text.
    pub async fn search(&self, text: &str, k: usize) -> Result<Vec<SimilarityResult>, EngineError> {
        self.query(text, k).await
    }

    /// Cached embed-and-query. Only successful lookups are cached.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<SimilarityResult>, EngineError> {
        if let Some(results) = self.cache.as_ref().and_then(|c| c.get(text, k)) {
            return Ok(results);
        }
        let vector = self.ctx.embedder.embed(text).await?;
        let results = self.ctx.index.query(&vector, k).await?;
        if let Some(cache) = &self.cache {
            cache.insert(text, k, results.clone());
        }
        Ok(results)
    }

    /// Run one analysis. Failures carry a [`FailureKind`] and internal detail.
    pub async fn analyze(
        &self,
        query_text: &str,
        analysis_type: AnalysisType,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        let case = Case::from_query_text(query_text);
        match analysis_type {
            AnalysisType::PrecedentSearch => self.precedent_search(&case).await,
            AnalysisType::DisabilityPrediction | AnalysisType::Comprehensive => {
                self.predict(&case, analysis_type).await
            }
        }
    }

    async fn precedent_search(&self, case: &Case) -> Result<AnalysisResult, AnalysisFailure> {
        let results = self
            .retrieve(&case.description)
            .await
            .map_err(RetrievalFailure::into_failure)?;
        let summary = self
            .context
            .summarize(self.ctx.summarizer.as_ref(), case, None, None, &results)
            .await;
        Ok(AnalysisResult {
            prediction: None,
            citations: results.iter().map(Citation::from).collect(),
            summary: Some(summary),
            compensation: None,
        })
    }

    async fn predict(
        &self,
        case: &Case,
        analysis_type: AnalysisType,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        let thresholds = self.ctx.config.thresholds;
        let mut evidence = Evidence::default();
        let mut retrieval_failure = None;

        let outcome = loop {
            match decide(&evidence, &thresholds) {
                Step::NeedExact => {
                    let hit = self.ctx.exact.lookup(&case.fields);
                    debug!(hit = hit.is_some(), "exact tier");
                    evidence.exact = Observation::Observed(hit);
                }
                Step::NeedSimilarity => {
                    evidence.similarity = match self.retrieve(&case.description).await {
                        Ok(results) => {
                            debug!(
                                results = results.len(),
                                top = results.first().map(|r| r.score),
                                "similarity tier"
                            );
                            Observation::Observed(results)
                        }
                        Err(failure) => {
                            warn!(error = failure.message(), "similarity tier unavailable");
                            let unavailable = Observation::Unavailable(failure.message().to_string());
                            retrieval_failure = Some(failure);
                            unavailable
                        }
                    };
                }
                Step::NeedModel => {
                    evidence.model = self.classify(case).await;
                }
                Step::Decided(outcome) => break outcome,
            }
        };

        if let TierOutcome::NoResult {
            reason: NoResultReason::AllTiersUnavailable,
        } = outcome
        {
            let failure = match retrieval_failure {
                Some(f) => f.into_failure(),
                None => AnalysisFailure::new(FailureKind::Unavailable, "no tier could run"),
            };
            return Err(failure);
        }

        let mut results = match evidence.similarity {
            Observation::Observed(results) => results,
            _ => vec![],
        };
        // Exact matches skip retrieval; comprehensive reports still cite precedents.
        if analysis_type.wants_summary() && matches!(outcome, TierOutcome::ExactMatch { .. }) {
            results = self.retrieve(&case.description).await.unwrap_or_default();
        }

        info!(
            tier = %outcome.tier(),
            grade = outcome.grade().map(|g| g.get()),
            confidence = outcome.confidence(),
            "tier decided"
        );

        let prediction = prediction_result(&outcome, &results);
        let compensation = match (prediction.grade, case.fields.monthly_salary) {
            (Some(grade), Some(salary)) => Some(compensation::estimate(grade, salary)),
            _ => None,
        };

        let summary = if analysis_type.wants_summary() {
            Some(
                self.context
                    .summarize(
                        self.ctx.summarizer.as_ref(),
                        case,
                        Some(&prediction),
                        compensation.as_ref(),
                        &results,
                    )
                    .await,
            )
        } else {
            None
        };

        Ok(AnalysisResult {
            citations: results.iter().map(Citation::from).collect(),
            prediction: Some(prediction),
            summary,
            compensation,
        })
    }

    async fn retrieve(&self, text: &str) -> Result<Vec<SimilarityResult>, RetrievalFailure> {
        self.query(text, self.ctx.config.retrieval.top_k)
            .await
            .map_err(|e| match e {
                EngineError::Embed(e) if e.is_input_error() => RetrievalFailure::Input(e.to_string()),
                EngineError::Store(e) => {
                    RetrievalFailure::Unavailable(format!("index unavailable: {e}"))
                }
                e => RetrievalFailure::Unavailable(e.to_string()),
            })
    }

    async fn classify(&self, case: &Case) -> Observation<sanzero_core::GradeDistribution> {
        let Some(classifier) = &self.ctx.classifier else {
            return Observation::Unavailable("no classifier configured".into());
        };
        let features = features::encode(&case.fields);
        match classifier.predict(&features).await {
            Ok(dist) => {
                debug!(top = dist.top().probability, "model tier");
                Observation::Observed(dist)
            }
            Err(e) => {
                warn!(error = %e, "model tier unavailable");
                Observation::Unavailable(e.to_string())
            }
        }
    }
}

fn prediction_result(outcome: &TierOutcome, results: &[SimilarityResult]) -> PredictionResult {
    let supporting = |n: usize| -> Vec<String> {
        results
            .iter()
            .take(n)
            .map(|r| r.case_number().to_string())
            .collect()
    };

    let (supporting_precedents, top_predictions, explanation) = match outcome {
        TierOutcome::ExactMatch { grade, reference } => (
            supporting(3),
            vec![],
            format!("Exact match in the curated grade table ({reference}): {grade}."),
        ),
        TierOutcome::SimilarityMatch {
            grade,
            confidence,
            voters,
        } => (
            supporting(*voters),
            vec![],
            format!(
                "{voters} similar precedent(s) voted; majority {grade}, top similarity {confidence:.2}."
            ),
        ),
        TierOutcome::ModelPrediction {
            grade,
            confidence,
            top,
        } => (
            vec![],
            top.clone(),
            format!("No close precedent; the grade model predicts {grade} with probability {confidence:.2}."),
        ),
        TierOutcome::NoResult { .. } => (
            supporting(3),
            vec![],
            "No tier produced a prediction above its confidence threshold.".to_string(),
        ),
    };

    PredictionResult {
        grade: outcome.grade(),
        confidence: outcome.confidence(),
        tier_used: outcome.tier(),
        supporting_precedents,
        top_predictions,
        explanation,
    }
}
