//! Explicitly built service dependencies.
//!
//! Every model, client, and store the engine touches is owned by one
//! [`ServiceContext`], built once at startup and shared by reference.

use std::sync::Arc;

use sanzero_ai::{
    DisabledSummarizer, GradeClassifier, HashingEmbedder, Summarizer, TextEmbedder,
    WeightedGradeModel,
};
use sanzero_core::EngineConfig;
use sanzero_store::{
    ExactMatchTable, InMemoryRequestRepository, IndexParams, PrecedentIndex, PrecedentStore,
    RequestRepository,
};
use tracing::info;

use crate::EngineError;

pub struct ServiceContext {
    pub config: EngineConfig,
    pub embedder: Arc<dyn TextEmbedder>,
    pub index: Arc<dyn PrecedentIndex>,
    pub exact: Arc<ExactMatchTable>,
    /// `None` when no classifier is deployed; the model tier is then unavailable.
    pub classifier: Option<Arc<dyn GradeClassifier>>,
    pub summarizer: Arc<dyn Summarizer>,
    pub requests: Arc<dyn RequestRepository>,
}

impl ServiceContext {
    pub fn builder(config: EngineConfig) -> ServiceContextBuilder {
        ServiceContextBuilder::new(config)
    }
}

pub struct ServiceContextBuilder {
    config: EngineConfig,
    embedder: Option<Arc<dyn TextEmbedder>>,
    index: Option<Arc<dyn PrecedentIndex>>,
    exact: Option<Arc<ExactMatchTable>>,
    classifier: Option<Option<Arc<dyn GradeClassifier>>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    requests: Option<Arc<dyn RequestRepository>>,
}

impl ServiceContextBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            embedder: None,
            index: None,
            exact: None,
            classifier: None,
            summarizer: None,
            requests: None,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn PrecedentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn exact(mut self, table: ExactMatchTable) -> Self {
        self.exact = Some(Arc::new(table));
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn GradeClassifier>) -> Self {
        self.classifier = Some(Some(classifier));
        self
    }

    pub fn without_classifier(mut self) -> Self {
        self.classifier = Some(None);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn requests(mut self, requests: Arc<dyn RequestRepository>) -> Self {
        self.requests = Some(requests);
        self
    }

    /// Validate the configuration and fill unset parts with defaults: hashing
    /// embedder, empty in-memory store, empty exact table, built-in weighted
    /// classifier, disabled summarizer, in-memory request repository.
    pub fn build(self) -> Result<ServiceContext, EngineError> {
        self.config.validate()?;
        let dim = self.config.embedding.dim;

        let embedder = self.embedder.unwrap_or_else(|| {
            Arc::new(HashingEmbedder::new(dim, self.config.embedding.max_chars))
        });
        let index = self.index.unwrap_or_else(|| {
            Arc::new(PrecedentStore::new(
                dim,
                IndexParams::from(&self.config.retrieval),
            ))
        });
        if embedder.dim() != index.dim() {
            return Err(EngineError::DimensionMismatch {
                embedder: embedder.dim(),
                index: index.dim(),
            });
        }

        let classifier = self
            .classifier
            .unwrap_or_else(|| Some(Arc::new(WeightedGradeModel::default())));

        let ctx = ServiceContext {
            embedder,
            index,
            exact: self.exact.unwrap_or_default(),
            classifier,
            summarizer: self
                .summarizer
                .unwrap_or_else(|| Arc::new(DisabledSummarizer)),
            requests: self
                .requests
                .unwrap_or_else(|| Arc::new(InMemoryRequestRepository::new())),
            config: self.config,
        };
        info!(
            dim = ctx.index.dim(),
            exact_entries = ctx.exact.len(),
            classifier = ctx.classifier.is_some(),
            summarizer = ctx.summarizer.name(),
            "service context ready"
        );
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let ctx = ServiceContext::builder(EngineConfig::default()).build().unwrap();
        assert_eq!(ctx.embedder.dim(), 384);
        assert!(ctx.classifier.is_some());
        assert!(ctx.exact.is_empty());
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let err = ServiceContext::builder(EngineConfig::default())
            .embedder(Arc::new(HashingEmbedder::new(8, 100)))
            .build()
            .err()
            .expect("mismatched dims must fail");
        assert!(matches!(
            err,
            EngineError::DimensionMismatch { embedder: 8, index: 384 }
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.inclusion = 0.9;
        assert!(matches!(
            ServiceContext::builder(config).build(),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn classifier_can_be_absent() {
        let ctx = ServiceContext::builder(EngineConfig::default())
            .without_classifier()
            .build()
            .unwrap();
        assert!(ctx.classifier.is_none());
    }
}
