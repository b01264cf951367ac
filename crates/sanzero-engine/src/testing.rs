//! Test doubles shared by the engine's test suites.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sanzero_ai::{
    EmbedError, GradeClassifier, InferenceError, SummarizeError, Summarizer, SummaryRequest,
    TextEmbedder,
};
use sanzero_core::{
    AnalysisRequest, AnalysisStatus, DisabilityGrade, GradeDistribution, Precedent,
    PrecedentMetadata, RequestId, SimilarityResult,
};
use sanzero_store::{
    InMemoryRequestRepository, IndexParams, PrecedentIndex, PrecedentStore, RequestRepository,
    StoreError,
};

pub const DIM: usize = 4;

pub fn precedent(case_number: &str, embedding: [f32; DIM], grade: u8) -> Precedent {
    Precedent {
        case_number: case_number.into(),
        embedding: embedding.to_vec(),
        grade: DisabilityGrade::new(grade).unwrap(),
        metadata: PrecedentMetadata {
            title: format!("Precedent {case_number}"),
            ..Default::default()
        },
        quality_score: 0.5,
    }
}

pub fn store_with(precedents: Vec<Precedent>) -> Arc<PrecedentStore> {
    let store = PrecedentStore::new(DIM, IndexParams::default());
    store.insert_many(precedents).unwrap();
    Arc::new(store)
}

/// Returns the same vector for every input.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    fn dim(&self) -> usize {
        self.0.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.0.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl TextEmbedder for FailingEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Backend("model not loaded".into()))
    }
}

/// Never finishes embedding.
pub struct PendingEmbedder;

#[async_trait]
impl TextEmbedder for PendingEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        std::future::pending().await
    }
}

/// Confident grade-10 prediction that records how often it ran.
#[derive(Default)]
pub struct CountingClassifier {
    calls: AtomicUsize,
}

impl CountingClassifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GradeClassifier for CountingClassifier {
    async fn predict(&self, _features: &[f32]) -> Result<GradeDistribution, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let probs = (1..=14).map(|g| if g == 10 { 0.87 } else { 0.01 }).collect();
        Ok(GradeDistribution::new(probs)?)
    }
}

/// Takes a minute to answer.
pub struct SlowSummarizer;

#[async_trait]
impl Summarizer for SlowSummarizer {
    fn name(&self) -> &str {
        "slow"
    }

    async fn summarize(&self, _request: &SummaryRequest) -> Result<String, SummarizeError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("generated too late".into())
    }
}

/// Returns the same vector for every input and counts the calls.
pub struct CountingEmbedder {
    vector: Vec<f32>,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextEmbedder for CountingEmbedder {
    fn dim(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

/// Remote index whose backend is down.
pub struct UnavailableIndex;

#[async_trait]
impl PrecedentIndex for UnavailableIndex {
    fn dim(&self) -> usize {
        DIM
    }

    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<SimilarityResult>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// In-memory repository whose first `failures` updates fail.
pub struct FlakyRepository {
    inner: InMemoryRequestRepository,
    failures: usize,
    updates: AtomicUsize,
}

impl FlakyRepository {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryRequestRepository::new(),
            failures,
            updates: AtomicUsize::new(0),
        }
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestRepository for FlakyRepository {
    async fn insert(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        self.inner.insert(request).await
    }

    async fn get(&self, id: RequestId) -> Result<Option<AnalysisRequest>, StoreError> {
        self.inner.get(id).await
    }

    async fn update(&self, request: &AnalysisRequest) -> Result<(), StoreError> {
        if self.updates.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        self.inner.update(request).await
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        status: Option<AnalysisStatus>,
    ) -> Result<Vec<AnalysisRequest>, StoreError> {
        self.inner.list_for_user(user_id, limit, status).await
    }
}
