//! In-memory precedent store with cosine nearest-neighbour queries.
//!
//! Small stores are scanned exactly. Once the store grows past
//! `exact_scan_limit` an HNSW graph supplies candidates, which are then
//! re-scored exactly so both paths share one ordering: score descending,
//! higher quality score, smaller case number.
//!
//! Readers run concurrently; writers take the lock exclusively, so a query
//! never observes a half-applied insert or a removed precedent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use sanzero_core::config::RetrievalConfig;
use sanzero_core::vector::{cosine_similarity, l2_norm};
use sanzero_core::{Precedent, SimilarityResult, rank_order};
use tracing::{debug, info};

use crate::StoreError;
use crate::ann::{AnnIndex, AnnParams};

/// Read access to a precedent index, local or remote.
#[async_trait]
pub trait PrecedentIndex: Send + Sync {
    /// Embedding dimension every stored vector has.
    fn dim(&self) -> usize;

    /// Top-`k` precedents by cosine similarity, in canonical rank order.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarityResult>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    pub exact_scan_limit: usize,
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub candidate_multiplier: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for IndexParams {
    fn from(c: &RetrievalConfig) -> Self {
        Self {
            exact_scan_limit: c.exact_scan_limit,
            max_connections: c.hnsw_max_connections,
            ef_construction: c.hnsw_ef_construction,
            ef_search: c.hnsw_ef_search,
            candidate_multiplier: c.candidate_multiplier.max(1),
        }
    }
}

impl IndexParams {
    fn ann(&self) -> AnnParams {
        AnnParams {
            max_connections: self.max_connections,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }
}

pub struct PrecedentStore {
    dim: usize,
    params: IndexParams,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Arc<Precedent>>,
    ann: Option<AnnIndex>,
}

impl PrecedentStore {
    pub fn new(dim: usize, params: IndexParams) -> Self {
        Self {
            dim,
            params,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Whether queries currently go through the approximate graph.
    pub fn is_approximate(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.ann.is_some())
    }

    pub fn get(&self, case_number: &str) -> Result<Option<Arc<Precedent>>, StoreError> {
        Ok(self.read()?.records.get(case_number).cloned())
    }

    /// Insert a precedent. Fails with [`StoreError::DuplicateKey`] if the case
    /// number is already stored.
    pub fn insert(&self, precedent: Precedent) -> Result<(), StoreError> {
        self.validate(&precedent)?;
        let mut inner = self.write()?;
        if inner.records.contains_key(&precedent.case_number) {
            return Err(StoreError::DuplicateKey(precedent.case_number));
        }
        let case_number = precedent.case_number.clone();
        self.insert_unchecked(&mut inner, precedent);
        debug!(case_number = %case_number, total = inner.records.len(), "inserted precedent");
        Ok(())
    }

    /// Insert a batch atomically: either every precedent is stored or none is.
    pub fn insert_many(&self, precedents: Vec<Precedent>) -> Result<usize, StoreError> {
        let mut seen = HashSet::with_capacity(precedents.len());
        for p in &precedents {
            self.validate(p)?;
            if !seen.insert(p.case_number.as_str()) {
                return Err(StoreError::DuplicateKey(p.case_number.clone()));
            }
        }

        let mut inner = self.write()?;
        if let Some(dup) = precedents
            .iter()
            .find(|p| inner.records.contains_key(&p.case_number))
        {
            return Err(StoreError::DuplicateKey(dup.case_number.clone()));
        }

        let count = precedents.len();
        for p in precedents {
            self.insert_unchecked(&mut inner, p);
        }
        info!(
            inserted = count,
            total = inner.records.len(),
            approximate = inner.ann.is_some(),
            "loaded precedents"
        );
        Ok(count)
    }

    /// Remove a precedent. Subsequent queries never return it.
    pub fn remove(&self, case_number: &str) -> Result<Arc<Precedent>, StoreError> {
        let mut inner = self.write()?;
        let removed = inner
            .records
            .remove(case_number)
            .ok_or_else(|| StoreError::PrecedentNotFound(case_number.to_string()))?;

        if inner.records.len() <= self.params.exact_scan_limit {
            inner.ann = None;
        } else {
            let stale = match inner.ann.as_mut() {
                Some(ann) => {
                    ann.remove(case_number);
                    ann.tombstones() > ann.live_len()
                }
                None => false,
            };
            if stale {
                self.rebuild_ann(&mut inner);
            }
        }
        debug!(case_number, total = inner.records.len(), "removed precedent");
        Ok(removed)
    }

    /// Replace a precedent's embedding: removal then reinsertion under one write lock.
    pub fn replace_embedding(
        &self,
        case_number: &str,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let existing = inner
            .records
            .get(case_number)
            .cloned()
            .ok_or_else(|| StoreError::PrecedentNotFound(case_number.to_string()))?;

        let updated = Precedent {
            embedding,
            ..(*existing).clone()
        };
        self.validate(&updated)?;

        inner.records.remove(case_number);
        if let Some(ann) = inner.ann.as_mut() {
            ann.remove(case_number);
        }
        self.insert_unchecked(&mut inner, updated);
        Ok(())
    }

    /// Top-`k` precedents by cosine similarity. An empty store yields an empty list.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarityResult>, StoreError> {
        if vector.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let inner = self.read()?;
        if k == 0 || inner.records.is_empty() {
            return Ok(vec![]);
        }

        let mut results: Vec<SimilarityResult> = match &inner.ann {
            Some(ann) if l2_norm(vector) > 0.0 => {
                let fetch = k.saturating_mul(self.params.candidate_multiplier);
                ann.search(vector, fetch)
                    .into_iter()
                    .filter_map(|case_number| inner.records.get(case_number))
                    .map(|p| score(p, vector))
                    .collect()
            }
            _ => inner.records.values().map(|p| score(p, vector)).collect(),
        };

        results.sort_by(rank_order);
        results.truncate(k);
        Ok(results)
    }

    // ── Internal ──

    fn validate(&self, precedent: &Precedent) -> Result<(), StoreError> {
        if precedent.embedding.len() != self.dim {
            return Err(StoreError::DimensionMismatch {
                expected: self.dim,
                actual: precedent.embedding.len(),
            });
        }
        let norm = l2_norm(&precedent.embedding);
        if !norm.is_finite() || norm == 0.0 {
            return Err(StoreError::InvalidEmbedding(precedent.case_number.clone()));
        }
        if !(0.0..=1.0).contains(&precedent.quality_score) {
            return Err(StoreError::InvalidQuality(precedent.case_number.clone()));
        }
        Ok(())
    }

    fn insert_unchecked(&self, inner: &mut Inner, precedent: Precedent) {
        let precedent = Arc::new(precedent);
        if let Some(ann) = inner.ann.as_mut() {
            ann.insert(&precedent.case_number, &precedent.embedding);
        }
        inner
            .records
            .insert(precedent.case_number.clone(), precedent);

        if inner.ann.is_none() && inner.records.len() > self.params.exact_scan_limit {
            self.rebuild_ann(inner);
        }
    }

    fn rebuild_ann(&self, inner: &mut Inner) {
        // Sorted insertion keeps the graph reproducible for a given record set.
        let mut points: Vec<(&str, &[f32])> = inner
            .records
            .values()
            .map(|p| (p.case_number.as_str(), p.embedding.as_slice()))
            .collect();
        points.sort_by(|a, b| a.0.cmp(b.0));
        let ann = AnnIndex::build(self.params.ann(), points.into_iter());
        info!(points = ann.live_len(), "rebuilt approximate index");
        inner.ann = Some(ann);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }
}

fn score(precedent: &Arc<Precedent>, vector: &[f32]) -> SimilarityResult {
    SimilarityResult {
        precedent: Arc::clone(precedent),
        score: cosine_similarity(&precedent.embedding, vector),
    }
}

#[async_trait]
impl PrecedentIndex for PrecedentStore {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SimilarityResult>, StoreError> {
        PrecedentStore::query(self, vector, k)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        PrecedentStore::len(self)
    }
}
