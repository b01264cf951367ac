//! Vertical card display for analysis requests and precedent hits.
//!
//! Renders one request as a grouped, human-readable card: request state,
//! prediction, compensation, cited precedents, then the summary.

use std::fmt::Write as _;

use sanzero_core::compensation::PaymentKind;
use sanzero_core::{
    AnalysisRequest, AnalysisResult, Citation, CompensationEstimate, PredictionResult,
};

const MAX_TOP_PREDICTIONS: usize = 3;
const MAX_TITLE_CHARS: usize = 60;

// ── Public API ──

pub fn print_request_card(request: &AnalysisRequest) {
    print!("{}", render_request_card(request));
}

pub fn print_citations(citations: &[Citation]) {
    print!("{}", render_citations(citations));
}

pub fn render_request_card(request: &AnalysisRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", request.id);
    let _ = writeln!(out, "{}", request.query_text);
    let _ = writeln!(out);

    let _ = writeln!(out, "Request");
    row(&mut out, "type", request.analysis_type);
    row(&mut out, "status", request.status);
    if let Some(ms) = request.processing_time_ms {
        row(&mut out, "processing_time", format!("{ms} ms"));
    }
    if let Some(message) = request.user_message() {
        row(&mut out, "error", message);
    }
    let _ = writeln!(out);

    if let Some(result) = &request.result {
        render_result(&mut out, result);
    }
    out
}

pub fn render_citations(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return "No similar precedents.\n".to_string();
    }
    let mut out = String::new();
    for (rank, c) in citations.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>2}. {:<14} {:.3}  {:<9} {}",
            rank + 1,
            c.case_number,
            c.score,
            c.grade.to_string(),
            truncate(&c.title, MAX_TITLE_CHARS)
        );
    }
    out
}

// ── Section rendering ──

fn render_result(out: &mut String, result: &AnalysisResult) {
    if let Some(prediction) = &result.prediction {
        render_prediction(out, prediction);
    }
    if let Some(estimate) = &result.compensation {
        render_compensation(out, estimate);
    }
    if !result.citations.is_empty() {
        let _ = writeln!(out, "Precedents");
        out.push_str(&render_citations(&result.citations));
        let _ = writeln!(out);
    }
    if let Some(summary) = &result.summary {
        let _ = writeln!(out, "Summary ({:?})", summary.source);
        for line in summary.text.lines() {
            let _ = writeln!(out, "  {line}");
        }
        let _ = writeln!(out);
    }
}

fn render_prediction(out: &mut String, p: &PredictionResult) {
    let _ = writeln!(out, "Prediction");
    match p.grade {
        Some(grade) => row(out, "grade", format!("{grade} ({})", grade.description())),
        None => row(out, "grade", "none"),
    }
    row(
        out,
        "confidence",
        format!("{:.2} ({:?})", p.confidence, p.accuracy()),
    );
    row(out, "tier", p.tier_used);
    if !p.top_predictions.is_empty() {
        let top: Vec<String> = p
            .top_predictions
            .iter()
            .take(MAX_TOP_PREDICTIONS)
            .map(|gp| format!("{} {:.2}", gp.grade, gp.probability))
            .collect();
        row(out, "top_predictions", top.join(", "));
    }
    if !p.supporting_precedents.is_empty() {
        row(out, "supporting", p.supporting_precedents.join(", "));
    }
    if !p.explanation.is_empty() {
        row(out, "explanation", &p.explanation);
    }
    let _ = writeln!(out);
}

fn render_compensation(out: &mut String, e: &CompensationEstimate) {
    let _ = writeln!(out, "Compensation");
    row(out, "daily_wage", format!("{} KRW", thousands(e.daily_wage)));
    row(out, "benefit_days", e.benefit_days);
    match e.payment {
        PaymentKind::Pension => {
            row(out, "annual_pension", format!("{} KRW", thousands(e.amount)));
            if let Some(monthly) = e.monthly_amount {
                row(out, "monthly", format!("{} KRW", thousands(monthly)));
            }
        }
        PaymentKind::LumpSum => {
            row(out, "lump_sum", format!("{} KRW", thousands(e.amount)));
        }
    }
    let _ = writeln!(out);
}

// ── Formatting helpers ──

fn row(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "  {label:<26} {value}");
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
