//! Analysis engine: the exact → similarity → model tier cascade, precedent
//! context for summaries, and the asynchronous request lifecycle.

mod analysis;
pub use analysis::Engine;

mod cache;
pub use cache::{CacheStats, SearchCache};

mod context;
pub use context::{ContextBuilder, templated_summary};

mod error;
pub use error::{AnalysisFailure, EngineError};

mod lifecycle;
pub use lifecycle::AnalysisManager;

mod service;
pub use service::{ServiceContext, ServiceContextBuilder};

pub mod tier;
pub use tier::{Evidence, NoResultReason, Observation, Step, TierOutcome, decide};

#[cfg(test)]
mod testing;
