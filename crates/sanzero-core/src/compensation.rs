//! Disability benefit estimation under the industrial accident compensation scheme.
//!
//! Benefits are a number of days of average wage fixed per grade. Grades 1–3
//! are paid as an annual pension; grades 4–14 as a one-off lump sum.

use serde::{Deserialize, Serialize};

use crate::grade::{DisabilityGrade, GRADE_COUNT};

/// Statutory minimum daily wage used for benefit calculation (KRW).
pub const MIN_DAILY_WAGE: u64 = 87_500;
/// Statutory maximum daily wage used for benefit calculation (KRW).
pub const MAX_DAILY_WAGE: u64 = 350_000;
/// Monthly contractual hours for a standard 40-hour week.
pub const MONTHLY_HOURS: u64 = 209;
pub const HOURS_PER_DAY: u64 = 8;

/// Benefit days per grade, index 0 = grade 1.
pub const BENEFIT_DAYS: [u32; GRADE_COUNT] = [
    1474, 1309, 1155, 1012, 869, 737, 616, 495, 385, 286, 198, 121, 55, 22,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Pension,
    LumpSum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationEstimate {
    pub grade: DisabilityGrade,
    pub daily_wage: u64,
    pub benefit_days: u32,
    pub payment: PaymentKind,
    /// Annual amount for pensions, total amount for lump sums.
    pub amount: u64,
    /// Monthly instalment, pensions only.
    pub monthly_amount: Option<u64>,
}

/// Daily wage from a monthly salary, clamped to the statutory limits.
pub fn daily_wage(monthly_salary: u64) -> u64 {
    let hourly = monthly_salary / MONTHLY_HOURS;
    (hourly * HOURS_PER_DAY).clamp(MIN_DAILY_WAGE, MAX_DAILY_WAGE)
}

pub fn benefit_days(grade: DisabilityGrade) -> u32 {
    BENEFIT_DAYS[grade.index()]
}

/// Estimate the disability benefit for a grade and monthly salary.
pub fn estimate(grade: DisabilityGrade, monthly_salary: u64) -> CompensationEstimate {
    let daily_wage = daily_wage(monthly_salary);
    let days = benefit_days(grade);
    let amount = daily_wage * days as u64;
    let (payment, monthly_amount) = if grade.is_pension_grade() {
        (PaymentKind::Pension, Some(amount / 12))
    } else {
        (PaymentKind::LumpSum, None)
    };
    CompensationEstimate {
        grade,
        daily_wage,
        benefit_days: days,
        payment,
        amount,
        monthly_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(g: u8) -> DisabilityGrade {
        DisabilityGrade::new(g).unwrap()
    }

    #[test]
    fn daily_wage_respects_limits() {
        assert_eq!(daily_wage(0), MIN_DAILY_WAGE);
        assert_eq!(daily_wage(100_000_000), MAX_DAILY_WAGE);
        // 3,135,000 / 209 = 15,000 per hour → 120,000 per day.
        assert_eq!(daily_wage(3_135_000), 120_000);
    }

    #[test]
    fn benefit_days_decrease_with_grade() {
        for g in 1..GRADE_COUNT as u8 {
            assert!(benefit_days(grade(g)) > benefit_days(grade(g + 1)));
        }
    }

    #[test]
    fn pension_for_top_grades() {
        let est = estimate(grade(2), 3_135_000);
        assert_eq!(est.payment, PaymentKind::Pension);
        assert_eq!(est.amount, 120_000 * 1309);
        assert_eq!(est.monthly_amount, Some(120_000 * 1309 / 12));
    }

    #[test]
    fn lump_sum_for_lower_grades() {
        let est = estimate(grade(8), 3_135_000);
        assert_eq!(est.payment, PaymentKind::LumpSum);
        assert_eq!(est.amount, 120_000 * 495);
        assert!(est.monthly_amount.is_none());
    }
}
