pub mod case;
pub mod case_key;
pub mod compensation;
pub mod config;
pub mod features;
pub mod grade;
pub mod precedent;
pub mod prediction;
pub mod request;
pub mod schema;
pub mod vector;

pub use case::{AccidentType, BodyPart, Case, CaseFields, Gender, InjuryType, Severity};
pub use case_key::{CaseKey, normalize_disability_code};
pub use compensation::CompensationEstimate;
pub use config::{CacheConfig, ConfigError, EngineConfig, Thresholds};
pub use grade::{DisabilityGrade, DistributionError, GRADE_COUNT, GradeDistribution, GradeProbability};
pub use precedent::{Precedent, PrecedentMetadata, SimilarityResult, rank_order};
pub use prediction::{
    AccuracyLevel, AnalysisResult, Citation, PredictionResult, Summary, SummarySource, Tier,
};
pub use request::{
    AnalysisRequest, AnalysisStatus, AnalysisType, FailureKind, InvalidQuery, RequestId,
    TransitionError, validate_query_text,
};
pub use schema::precedents;
