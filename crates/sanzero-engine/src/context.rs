//! Precedent context and summaries.
//!
//! The context handed to the summarizer is bounded: precedents are rendered
//! whole, in rank order, and the lowest-ranked ones are dropped first when the
//! budget runs out. A failed or slow summarizer never fails an analysis; the
//! summary is then rendered from structured fields instead.

use std::fmt::Write as _;
use std::time::Duration;

use sanzero_ai::{Summarizer, SummaryRequest};
use sanzero_core::config::ContextConfig;
use sanzero_core::{
    Case, CompensationEstimate, PredictionResult, SimilarityResult, Summary, SummarySource,
};
use tracing::{info, warn};

// ── Prompt templates ──

const SYSTEM_PROMPT: &str = "\
You are an assistant to Korean industrial-accident compensation lawyers.

Given a new workplace-injury case and a ranked list of court precedents, write a short \
summary for the lawyer: which precedents are most relevant and why, what disability grade \
they point to, and any differences from the new case that could change the outcome.

Write plain prose in at most three short paragraphs. Cite precedents by case number. \
Do not invent precedents or facts that are not in the context.";

fn build_user_prompt(case: &Case, prediction: Option<&PredictionResult>, context: &str) -> String {
    let prediction = match prediction.and_then(|p| p.grade.map(|g| (g, p))) {
        Some((grade, p)) => format!(
            "{} (tier: {}, confidence {:.2})",
            grade, p.tier_used, p.confidence
        ),
        None => "none".to_string(),
    };
    format!(
        "New case:\n\
         {description}\n\
         \n\
         Predicted disability grade: {prediction}\n\
         \n\
         Precedents (most similar first):\n\
         {context}",
        description = case.description,
    )
}

/// One precedent rendered for the context window.
fn render_record(rank: usize, r: &SimilarityResult) -> String {
    let p = &r.precedent;
    let mut out = format!(
        "[{rank}] {case} | similarity {score:.2} | {grade}\n",
        case = p.case_number,
        score = r.score,
        grade = p.grade,
    );
    if !p.metadata.title.is_empty() {
        let _ = writeln!(out, "Title: {}", p.metadata.title);
    }
    if let Some(court) = &p.metadata.court {
        let _ = writeln!(out, "Court: {court}");
    }
    if let Some(outcome) = &p.metadata.outcome {
        let _ = writeln!(out, "Outcome: {outcome}");
    }
    if !p.metadata.summary.is_empty() {
        let _ = writeln!(out, "Summary: {}", p.metadata.summary);
    }
    out
}

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_chars: usize,
    timeout: Duration,
    max_tokens: u32,
}

impl From<&ContextConfig> for ContextBuilder {
    fn from(c: &ContextConfig) -> Self {
        Self {
            max_chars: c.max_chars,
            timeout: Duration::from_secs(c.summarizer_timeout_secs),
            max_tokens: c.max_tokens,
        }
    }
}

impl ContextBuilder {
    /// Render results in rank order within the character budget.
    ///
    /// Records are never split: the first record that does not fit ends the
    /// context, so an oversized top record yields an empty context.
    pub fn build_context(&self, results: &[SimilarityResult]) -> String {
        let mut context = String::new();
        let mut used = 0;
        for (i, r) in results.iter().enumerate() {
            let record = render_record(i + 1, r);
            let separator = usize::from(i > 0);
            let len = record.chars().count();
            if used + separator + len > self.max_chars {
                if i == 0 {
                    warn!(
                        chars = len,
                        max_chars = self.max_chars,
                        "top precedent exceeds context budget"
                    );
                }
                break;
            }
            if separator == 1 {
                context.push('\n');
            }
            context.push_str(&record);
            used += separator + len;
        }
        context
    }

    /// Summarize through `summarizer`, falling back to a templated summary on
    /// failure or timeout.
    pub async fn summarize(
        &self,
        summarizer: &dyn Summarizer,
        case: &Case,
        prediction: Option<&PredictionResult>,
        compensation: Option<&CompensationEstimate>,
        results: &[SimilarityResult],
    ) -> Summary {
        let context = self.build_context(results);
        let request = SummaryRequest {
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            user_prompt: build_user_prompt(case, prediction, &context),
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };

        match tokio::time::timeout(self.timeout, summarizer.summarize(&request)).await {
            Ok(Ok(text)) => {
                info!(summarizer = summarizer.name(), chars = text.len(), "summary generated");
                return Summary {
                    text,
                    source: SummarySource::Generated,
                };
            }
            Ok(Err(e)) => {
                warn!(summarizer = summarizer.name(), error = %e, "summarizer failed, using template");
            }
            Err(_) => {
                warn!(
                    summarizer = summarizer.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "summarizer timed out, using template"
                );
            }
        }

        Summary {
            text: templated_summary(prediction, compensation, results),
            source: SummarySource::Templated,
        }
    }
}

/// Summary rendered only from structured fields.
pub fn templated_summary(
    prediction: Option<&PredictionResult>,
    compensation: Option<&CompensationEstimate>,
    results: &[SimilarityResult],
) -> String {
    let mut out = String::new();

    if let Some(p) = prediction {
        match p.grade {
            Some(grade) => {
                let _ = writeln!(
                    out,
                    "Predicted {grade} ({}) from the {} tier, confidence {:.2} ({:?} accuracy).",
                    grade.description(),
                    p.tier_used,
                    p.confidence,
                    p.accuracy(),
                );
            }
            None => out
                .push_str("No disability grade could be predicted with sufficient confidence.\n"),
        }
    }

    if let Some(c) = compensation {
        let _ = writeln!(
            out,
            "Estimated benefit: {} KRW ({} days at a daily wage of {} KRW).",
            c.amount, c.benefit_days, c.daily_wage
        );
    }

    if results.is_empty() {
        out.push_str("No similar precedents were found.");
        return out;
    }

    let _ = writeln!(out, "Most similar precedents:");
    for r in results.iter().take(3) {
        let p = &r.precedent;
        let _ = write!(out, "- {} (similarity {:.2}, {})", p.case_number, r.score, p.grade);
        if !p.metadata.title.is_empty() {
            let _ = write!(out, ": {}", p.metadata.title);
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
