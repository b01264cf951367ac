//! Normalized exact-match keys for curated cases.
//!
//! A key combines injury type, severity, and the disability criteria code
//! from the statutory grading table. Codes are written inconsistently in
//! source material ("8-3", "08 - 03", "8–3", "8.3"), so they are normalised
//! before comparison:
//!
//! 1. Trim and uppercase
//! 2. Treat `-`, `.`, `_`, en/em dashes and whitespace as segment separators
//! 3. Strip leading zeros from every numeric segment
//! 4. Join as `injury|severity|code`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::case::{CaseFields, InjuryType, Severity};

/// Normalized key used by the exact matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseKey(String);

impl CaseKey {
    /// Build a key. Returns `None` if the disability code normalises to nothing.
    pub fn new(injury_type: InjuryType, severity: Severity, disability_code: &str) -> Option<Self> {
        let code = normalize_disability_code(disability_code);
        if code.is_empty() {
            return None;
        }
        Some(Self(format!(
            "{}|{}|{}",
            injury_type.as_str(),
            severity.as_str(),
            code
        )))
    }

    /// Key for a case, if all three key fields are present.
    pub fn from_fields(fields: &CaseFields) -> Option<Self> {
        Self::new(
            fields.injury_type?,
            fields.severity?,
            fields.disability_code.as_deref()?,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise a disability criteria code.
///
/// Input: "8-3", " 08 - 03 ", "8–3", "8.3", "12-4a"
/// Output: "8-3", "8-3", "8-3", "8-3", "12-4A"
pub fn normalize_disability_code(s: &str) -> String {
    let upper = s.trim().to_uppercase();

    // Split on any separator, dropping empty segments.
    let segments: Vec<String> = upper
        .split(|c: char| matches!(c, '-' | '.' | '_' | '–' | '—') || c.is_whitespace())
        .filter(|seg| !seg.is_empty())
        .map(strip_leading_zeros)
        .collect();

    segments.join("-")
}

/// "03" → "3", "0" → "0", "04A" → "4A".
fn strip_leading_zeros(seg: &str) -> String {
    if !seg.starts_with(|c: char| c.is_ascii_digit()) {
        return seg.to_string();
    }
    let trimmed = seg.trim_start_matches('0');
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        format!("0{trimmed}")
    }
}
