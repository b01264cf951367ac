//! Approximate nearest-neighbour graph over precedent embeddings.
//!
//! Wraps an `hnsw_rs` graph with cosine distance. The graph itself cannot
//! delete points, so removal drops the id mapping and the point becomes a
//! tombstone that search skips. The owner rebuilds once tombstones pile up.

use std::collections::HashMap;

use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use tracing::debug;

const MAX_LAYER: usize = 16;

#[derive(Debug, Clone, Copy)]
pub(crate) struct AnnParams {
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

pub(crate) struct AnnIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    params: AnnParams,
    /// Graph id → case number, live points only.
    by_id: HashMap<usize, String>,
    by_case: HashMap<String, usize>,
    next_id: usize,
}

impl AnnIndex {
    pub fn new(params: AnnParams, capacity: usize) -> Self {
        let hnsw = Hnsw::<f32, DistCosine>::new(
            params.max_connections,
            capacity.max(1024),
            MAX_LAYER,
            params.ef_construction,
            DistCosine {},
        );
        Self {
            hnsw,
            params,
            by_id: HashMap::new(),
            by_case: HashMap::new(),
            next_id: 0,
        }
    }

    /// Build a graph from `(case_number, embedding)` pairs.
    pub fn build<'a>(
        params: AnnParams,
        points: impl ExactSizeIterator<Item = (&'a str, &'a [f32])>,
    ) -> Self {
        let mut index = Self::new(params, points.len() * 2);
        for (case_number, vector) in points {
            index.insert(case_number, vector);
        }
        debug!(points = index.live_len(), "built hnsw graph");
        index
    }

    pub fn insert(&mut self, case_number: &str, vector: &[f32]) {
        let id = self.next_id;
        self.next_id += 1;
        self.hnsw.insert_slice((vector, id));
        self.by_id.insert(id, case_number.to_string());
        self.by_case.insert(case_number.to_string(), id);
    }

    pub fn remove(&mut self, case_number: &str) {
        if let Some(id) = self.by_case.remove(case_number) {
            self.by_id.remove(&id);
        }
    }

    /// Up to `k` live case numbers closest to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<&str> {
        if k == 0 || self.by_id.is_empty() {
            return vec![];
        }
        // Tombstones occupy result slots, so over-fetch by their count.
        let fetch = (k + self.tombstones()).min(self.next_id);
        let ef = self.params.ef_search.max(fetch);
        self.hnsw
            .search(query, fetch, ef)
            .into_iter()
            .filter_map(|n| self.by_id.get(&n.d_id).map(String::as_str))
            .take(k)
            .collect()
    }

    pub fn live_len(&self) -> usize {
        self.by_id.len()
    }

    pub fn tombstones(&self) -> usize {
        self.next_id - self.by_id.len()
    }
}
