//! Analysis requests and their lifecycle state machine.
//!
//! A request moves along exactly one path: `pending → processing →
//! {completed | failed}`. Terminal records are immutable; every mutator
//! checks the transition and refuses to touch a finished request.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::prediction::AnalysisResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Retrieve and summarise similar precedents only.
    PrecedentSearch,
    /// Run the tier cascade to predict a disability grade.
    DisabilityPrediction,
    /// Cascade, citations, summary, and compensation estimate.
    Comprehensive,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrecedentSearch => "precedent_search",
            Self::DisabilityPrediction => "disability_prediction",
            Self::Comprehensive => "comprehensive",
        }
    }

    pub fn predicts_grade(&self) -> bool {
        !matches!(self, Self::PrecedentSearch)
    }

    pub fn wants_summary(&self) -> bool {
        !matches!(self, Self::DisabilityPrediction)
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "precedent_search" | "search" => Ok(Self::PrecedentSearch),
            "disability_prediction" | "prediction" | "predict" => Ok(Self::DisabilityPrediction),
            "comprehensive" | "full" => Ok(Self::Comprehensive),
            other => Err(format!("unknown analysis type: {other}")),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        matches!(
            (*self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request failed. Cancellation is never folded into another kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Cancelled,
    DeadlineExceeded,
    /// Every tier was unusable.
    Unavailable,
    /// The input could not be analysed by any tier.
    InvalidInput,
    Internal,
}

impl FailureKind {
    /// Message safe to show to the requesting user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Cancelled => "The analysis was cancelled.",
            Self::DeadlineExceeded => "The analysis took too long and was stopped. Please try again.",
            Self::Unavailable => {
                "The analysis service is temporarily unavailable. Please try again later."
            }
            Self::InvalidInput => {
                "The case description could not be analysed. Please describe the injury in more detail."
            }
            Self::Internal => "The analysis could not be completed.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for request {id}: {from} → {to}")]
pub struct TransitionError {
    pub id: RequestId,
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
}

/// Rejection reasons for query text at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidQuery {
    #[error("query text is empty")]
    Empty,
    #[error("query text is too short ({0} characters, minimum {MIN_QUERY_CHARS})")]
    TooShort(usize),
    #[error("query text is mostly a single repeated character")]
    Repetitive,
    #[error("query text contains only digits")]
    DigitsOnly,
    #[error("query text contains no letters or digits")]
    SymbolsOnly,
}

pub const MIN_QUERY_CHARS: usize = 5;

/// Reject query text that cannot describe an injury case.
pub fn validate_query_text(text: &str) -> Result<(), InvalidQuery> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InvalidQuery::Empty);
    }
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() < MIN_QUERY_CHARS {
        return Err(InvalidQuery::TooShort(chars.len()));
    }
    if chars.iter().all(|c| c.is_ascii_digit()) {
        return Err(InvalidQuery::DigitsOnly);
    }
    if !chars.iter().any(|c| c.is_alphanumeric()) {
        return Err(InvalidQuery::SymbolsOnly);
    }

    // More than half one character, or a run of four or more covering a third of the text.
    let mut counts = std::collections::HashMap::new();
    for c in &chars {
        *counts.entry(*c).or_insert(0usize) += 1;
    }
    let most = counts.values().copied().max().unwrap_or(0);
    let mut run = 1;
    let mut longest_run = 1;
    for pair in chars.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
            longest_run = longest_run.max(run);
        } else {
            run = 1;
        }
    }
    if most * 2 > chars.len() || (longest_run >= 4 && longest_run * 3 >= chars.len()) {
        return Err(InvalidQuery::Repetitive);
    }
    Ok(())
}

/// A persisted analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub id: RequestId,
    pub user_id: String,
    pub application_id: Option<String>,
    pub query_text: String,
    pub analysis_type: AnalysisType,
    pub status: AnalysisStatus,
    pub result: Option<AnalysisResult>,
    pub failure: Option<FailureKind>,
    /// Internal failure detail. Never shown to users verbatim.
    pub error_message: Option<String>,
    /// Wall-clock processing time. Zero while processing, final once the
    /// request reaches a terminal state; absent while pending.
    pub processing_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisRequest {
    pub fn new(
        user_id: impl Into<String>,
        application_id: Option<String>,
        query_text: impl Into<String>,
        analysis_type: AnalysisType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RequestId::new(),
            user_id: user_id.into(),
            application_id,
            query_text: query_text.into(),
            analysis_type,
            status: AnalysisStatus::Pending,
            result: None,
            failure: None,
            error_message: None,
            processing_time_ms: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// User-facing failure message, if the request failed.
    pub fn user_message(&self) -> Option<&'static str> {
        self.failure.map(|k| k.user_message())
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(AnalysisStatus::Processing)?;
        self.started_at = Some(self.updated_at);
        self.processing_time_ms = Some(0);
        Ok(())
    }

    pub fn complete(
        &mut self,
        result: AnalysisResult,
        processing_time_ms: u64,
    ) -> Result<(), TransitionError> {
        self.transition(AnalysisStatus::Completed)?;
        self.result = Some(result);
        self.finish(processing_time_ms);
        Ok(())
    }

    pub fn fail(
        &mut self,
        kind: FailureKind,
        message: impl Into<String>,
        processing_time_ms: u64,
    ) -> Result<(), TransitionError> {
        self.transition(AnalysisStatus::Failed)?;
        self.failure = Some(kind);
        self.error_message = Some(message.into());
        self.finish(processing_time_ms);
        Ok(())
    }

    fn finish(&mut self, processing_time_ms: u64) {
        self.processing_time_ms = Some(processing_time_ms);
        self.finished_at = Some(self.updated_at);
    }

    fn transition(&mut self, to: AnalysisStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("user-1", None, "fell from ladder", AnalysisType::Comprehensive)
    }

    #[test]
    fn happy_path_completes() {
        let mut r = request();
        assert_eq!(r.status, AnalysisStatus::Pending);
        assert_eq!(r.processing_time_ms, None);
        r.start().unwrap();
        assert!(r.started_at.is_some());
        assert_eq!(r.processing_time_ms, Some(0));
        r.complete(AnalysisResult::default(), 42).unwrap();
        assert_eq!(r.status, AnalysisStatus::Completed);
        assert_eq!(r.processing_time_ms, Some(42));
        assert!(r.error_message.is_none());
    }

    #[test]
    fn cannot_skip_processing() {
        let mut r = request();
        let err = r.complete(AnalysisResult::default(), 1).unwrap_err();
        assert_eq!(err.from, AnalysisStatus::Pending);
        assert_eq!(err.to, AnalysisStatus::Completed);
        assert_eq!(r.status, AnalysisStatus::Pending);
    }

    #[test]
    fn terminal_requests_are_immutable() {
        let mut r = request();
        r.start().unwrap();
        r.fail(FailureKind::Cancelled, "cancelled by user", 5).unwrap();
        let snapshot = r.clone();

        assert!(r.complete(AnalysisResult::default(), 9).is_err());
        assert!(r.fail(FailureKind::Internal, "again", 9).is_err());
        assert!(r.start().is_err());
        assert_eq!(r, snapshot);
    }

    #[test]
    fn failure_carries_user_message() {
        let mut r = request();
        r.start().unwrap();
        r.fail(FailureKind::Cancelled, "token fired during similarity tier", 3)
            .unwrap();
        assert_eq!(r.user_message(), Some("The analysis was cancelled."));
        assert_eq!(
            r.error_message.as_deref(),
            Some("token fired during similarity tier")
        );
    }

    #[test]
    fn request_id_parses_back() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn analysis_type_aliases() {
        assert_eq!("search".parse::<AnalysisType>().unwrap(), AnalysisType::PrecedentSearch);
        assert_eq!(
            "disability-prediction".parse::<AnalysisType>().unwrap(),
            AnalysisType::DisabilityPrediction
        );
        assert!("astrology".parse::<AnalysisType>().is_err());
    }

    #[test]
    fn query_validation() {
        assert_eq!(validate_query_text("   "), Err(InvalidQuery::Empty));
        assert_eq!(validate_query_text("hand"), Err(InvalidQuery::TooShort(4)));
        assert_eq!(validate_query_text("1234567"), Err(InvalidQuery::DigitsOnly));
        assert_eq!(validate_query_text("!!?!?!"), Err(InvalidQuery::SymbolsOnly));
        assert_eq!(validate_query_text("aaaaaaab"), Err(InvalidQuery::Repetitive));
        assert!(validate_query_text("crushed right hand in a hydraulic press").is_ok());
        assert!(validate_query_text("fell 3 metres, L1 fracture").is_ok());
    }
}
