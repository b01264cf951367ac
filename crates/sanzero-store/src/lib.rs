//! Storage layer: in-memory precedent index (exact scan or HNSW), the curated
//! exact-match table, Parquet ingest, and analysis request repositories.

mod ann;
mod error;
pub use error::StoreError;

mod index;
pub use index::{IndexParams, PrecedentIndex, PrecedentStore};

mod exact;
pub use exact::{ExactEntry, ExactMatch, ExactMatchTable};

mod ingest;
pub use ingest::{ParquetLoad, get_string, precedents_from_batches, read_parquet, write_parquet};

mod requests;
pub use requests::{InMemoryRequestRepository, JsonDirRepository, RequestRepository};
