//! Feature vector encoding for the grade classifier.
//!
//! Each slot holds a small categorical code; `0.0` means the field is unknown.

use crate::case::CaseFields;

pub const FEATURE_LEN: usize = 8;

// ── Slot layout ──

pub const INJURY_TYPE: usize = 0;
pub const BODY_PART: usize = 1;
pub const TREATMENT_BAND: usize = 2;
pub const GENDER: usize = 3;
pub const AGE_BAND: usize = 4;
pub const INDUSTRY_GROUP: usize = 5;
pub const ACCIDENT_TYPE: usize = 6;
pub const SEVERITY: usize = 7;

/// Largest valid code per slot.
pub const SLOT_MAX: [u8; FEATURE_LEN] = [6, 9, 6, 2, 6, 8, 8, 4];

/// Encode structured case fields as a classifier feature vector.
pub fn encode(fields: &CaseFields) -> Vec<f32> {
    let mut v = vec![0.0f32; FEATURE_LEN];
    v[INJURY_TYPE] = fields.injury_type.map_or(0, |t| t.code()) as f32;
    v[BODY_PART] = fields.body_part.map_or(0, |b| b.code()) as f32;
    v[TREATMENT_BAND] = fields.treatment_days.map_or(0, treatment_band) as f32;
    v[GENDER] = fields.gender.map_or(0, |g| g.code()) as f32;
    v[AGE_BAND] = fields.age.map_or(0, age_band) as f32;
    v[INDUSTRY_GROUP] = fields.industry_code.as_deref().map_or(0, industry_group) as f32;
    v[ACCIDENT_TYPE] = fields.accident_type.map_or(0, |a| a.code()) as f32;
    v[SEVERITY] = fields.severity.map_or(0, |s| s.code()) as f32;
    v
}

/// Share of slots with a known value.
pub fn coverage(features: &[f32]) -> f32 {
    if features.is_empty() {
        return 0.0;
    }
    features.iter().filter(|&&x| x > 0.0).count() as f32 / features.len() as f32
}

/// Treatment period band: up to 1 month, 3 months, 6 months, 1 year, 2 years, longer.
pub fn treatment_band(days: u32) -> u8 {
    match days {
        0..=30 => 1,
        31..=90 => 2,
        91..=180 => 3,
        181..=365 => 4,
        366..=730 => 5,
        _ => 6,
    }
}

/// Age band by decade: under 30, 30s, 40s, 50s, 60s, 70 and over.
pub fn age_band(age: u32) -> u8 {
    match age {
        0..=29 => 1,
        30..=39 => 2,
        40..=49 => 3,
        50..=59 => 4,
        60..=69 => 5,
        _ => 6,
    }
}

/// Industry group from the leading section letter of an industry code.
///
/// 1 agriculture/mining, 2 manufacturing, 3 construction, 4 transport,
/// 5 trade/hospitality, 6 services, 7 health, 8 other.
pub fn industry_group(code: &str) -> u8 {
    match code.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('A' | 'B') => 1,
        Some('C') => 2,
        Some('F') => 3,
        Some('H') => 4,
        Some('G' | 'I') => 5,
        Some('J'..='N') => 6,
        Some('Q') => 7,
        Some(_) => 8,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{BodyPart, InjuryType, Severity};

    #[test]
    fn unknown_fields_encode_as_zero() {
        let v = encode(&CaseFields::default());
        assert_eq!(v, vec![0.0; FEATURE_LEN]);
        assert_eq!(coverage(&v), 0.0);
    }

    #[test]
    fn known_fields_use_codes() {
        let fields = CaseFields {
            injury_type: Some(InjuryType::Fracture),
            body_part: Some(BodyPart::Spine),
            severity: Some(Severity::Critical),
            industry_code: Some("c25".into()),
            treatment_days: Some(200),
            ..Default::default()
        };
        let v = encode(&fields);
        assert_eq!(v[INJURY_TYPE], 2.0);
        assert_eq!(v[BODY_PART], 9.0);
        assert_eq!(v[SEVERITY], 4.0);
        assert_eq!(v[INDUSTRY_GROUP], 2.0);
        assert_eq!(v[TREATMENT_BAND], 4.0);
        assert!((coverage(&v) - 5.0 / 8.0).abs() < 1e-6);
    }

    #[test]
    fn encoded_codes_stay_within_slot_max() {
        let fields = CaseFields {
            treatment_days: Some(10_000),
            age: Some(95),
            industry_code: Some("Z".into()),
            ..Default::default()
        };
        let v = encode(&fields);
        for (i, &x) in v.iter().enumerate() {
            assert!(x as u8 <= SLOT_MAX[i], "slot {i} = {x} exceeds {}", SLOT_MAX[i]);
        }
    }

    #[test]
    fn band_edges() {
        assert_eq!(treatment_band(30), 1);
        assert_eq!(treatment_band(31), 2);
        assert_eq!(age_band(29), 1);
        assert_eq!(age_band(70), 6);
        assert_eq!(industry_group(""), 0);
    }
}
