//! Injury case descriptions and their structured fields.
//!
//! A [`Case`] is transient: it lives for the duration of one analysis. Fields
//! can be supplied directly or as inline `key=value` tags in the query text,
//! e.g. `"press crushed right hand, severity=severe, injury=amputation"`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Defines a closed vocabulary enum with stable snake_case names, numeric
/// feature codes, and alias parsing.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident = $code:literal => $label:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Feature code used by the grade classifier. Zero is reserved for unknown.
            pub fn code(&self) -> u8 {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase().replace(['-', ' ', '/'], "_");
                match normalized.as_str() {
                    $($label $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(UnknownValue {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

vocabulary! {
    /// Primary injury type.
    InjuryType {
        Amputation = 1 => "amputation" | "severed",
        Fracture = 2 => "fracture" | "broken_bone",
        Dislocation = 3 => "dislocation",
        Sprain = 4 => "sprain" | "strain",
        Contusion = 5 => "contusion" | "bruise",
        Abrasion = 6 => "abrasion" | "laceration",
    }
}

vocabulary! {
    /// Clinical severity as assessed at intake.
    Severity {
        Minor = 1 => "minor" | "mild",
        Moderate = 2 => "moderate",
        Severe = 3 => "severe" | "serious",
        Critical = 4 => "critical",
    }
}

vocabulary! {
    /// Injured body region.
    BodyPart {
        Head = 1 => "head" | "face",
        Neck = 2 => "neck",
        Chest = 3 => "chest",
        Abdomen = 4 => "abdomen",
        Arm = 5 => "arm" | "shoulder",
        Leg = 6 => "leg" | "knee",
        Hand = 7 => "hand" | "finger",
        Foot = 8 => "foot" | "toe",
        Spine = 9 => "spine" | "back",
    }
}

vocabulary! {
    /// How the accident happened.
    AccidentType {
        Fall = 1 => "fall",
        Collision = 2 => "collision" | "struck",
        Caught = 3 => "caught" | "crush" | "entanglement",
        Cut = 4 => "cut",
        FireExplosion = 5 => "fire_explosion" | "fire" | "explosion",
        Traffic = 6 => "traffic",
        Machinery = 7 => "machinery" | "machine",
        Other = 8 => "other",
    }
}

vocabulary! {
    Gender {
        Male = 1 => "male" | "m",
        Female = 2 => "female" | "f",
    }
}

/// Structured fields of a case. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFields {
    pub injury_type: Option<InjuryType>,
    pub severity: Option<Severity>,
    pub body_part: Option<BodyPart>,
    pub accident_type: Option<AccidentType>,
    /// Disability criteria code from the statutory grading table, e.g. `8-3`.
    pub disability_code: Option<String>,
    /// Industry classification code, e.g. `C25` (manufacturing).
    pub industry_code: Option<String>,
    pub treatment_days: Option<u32>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    /// Average monthly salary in KRW.
    pub monthly_salary: Option<u64>,
    /// Medical cost incurred so far in KRW.
    pub medical_cost: Option<u64>,
}

impl CaseFields {
    /// Apply a single `key=value` tag. Returns `false` if the tag was not recognised.
    pub fn apply_tag(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim();
        let key = key.trim().to_lowercase();
        let applied = match key.as_str() {
            "injury" | "injury_type" => value.parse().map(|v| self.injury_type = Some(v)).is_ok(),
            "severity" => value.parse().map(|v| self.severity = Some(v)).is_ok(),
            "body" | "body_part" => value.parse().map(|v| self.body_part = Some(v)).is_ok(),
            "accident" | "accident_type" => {
                value.parse().map(|v| self.accident_type = Some(v)).is_ok()
            }
            "gender" => value.parse().map(|v| self.gender = Some(v)).is_ok(),
            "code" | "disability_code" if !value.is_empty() => {
                self.disability_code = Some(value.to_string());
                true
            }
            "industry" | "industry_code" if !value.is_empty() => {
                self.industry_code = Some(value.to_string());
                true
            }
            "treatment_days" | "treatment" => parse_amount(value)
                .and_then(|v| u32::try_from(v).ok())
                .map(|v| self.treatment_days = Some(v))
                .is_some(),
            "age" => parse_amount(value)
                .and_then(|v| u32::try_from(v).ok())
                .map(|v| self.age = Some(v))
                .is_some(),
            "salary" | "monthly_salary" => parse_amount(value)
                .map(|v| self.monthly_salary = Some(v))
                .is_some(),
            "medical_cost" | "medical" => parse_amount(value)
                .map(|v| self.medical_cost = Some(v))
                .is_some(),
            _ => false,
        };
        if !applied {
            debug!(key = %key, value, "ignored case tag");
        }
        applied
    }

    /// Fill fields from `other` where this one has none.
    pub fn merge_missing(&mut self, other: CaseFields) {
        self.injury_type = self.injury_type.or(other.injury_type);
        self.severity = self.severity.or(other.severity);
        self.body_part = self.body_part.or(other.body_part);
        self.accident_type = self.accident_type.or(other.accident_type);
        self.gender = self.gender.or(other.gender);
        self.treatment_days = self.treatment_days.or(other.treatment_days);
        self.age = self.age.or(other.age);
        self.monthly_salary = self.monthly_salary.or(other.monthly_salary);
        self.medical_cost = self.medical_cost.or(other.medical_cost);
        if self.disability_code.is_none() {
            self.disability_code = other.disability_code;
        }
        if self.industry_code.is_none() {
            self.industry_code = other.industry_code;
        }
    }
}

/// Parse `"3,500,000"` or `"3500000"` into an integer amount.
fn parse_amount(value: &str) -> Option<u64> {
    let digits: String = value.chars().filter(|c| *c != ',' && *c != '_').collect();
    digits.parse().ok()
}

/// A case submitted for analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub description: String,
    pub fields: CaseFields,
}

impl Case {
    pub fn new(description: impl Into<String>, fields: CaseFields) -> Self {
        Self {
            description: description.into(),
            fields,
        }
    }

    /// Build a case from free query text, extracting inline `key=value` tags.
    ///
    /// The full text (tags included) remains the description so embedding
    /// stays a function of exactly what the user submitted.
    pub fn from_query_text(text: &str) -> Self {
        let mut fields = CaseFields::default();
        for token in text.split(|c: char| c == ';' || c.is_whitespace()) {
            if let Some((key, value)) = token.split_once('=') {
                fields.apply_tag(key, value.trim_end_matches([',', '.']));
            }
        }
        Self {
            description: text.trim().to_string(),
            fields,
        }
    }
}
