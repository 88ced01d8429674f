//! Clinical formula engine.
//!
//! Pure functions computing body composition and population-predicted lung
//! function from demographics. The reference equations are simplified
//! linear regressions (GLI-2012 shaped) split by sex:
//!
//! | Quantity | Male                                 | Female                               | Floor |
//! |----------|--------------------------------------|--------------------------------------|-------|
//! | FEV1 (L) | 4.3·h_m − 0.029·age − 2.0            | 3.95·h_m − 0.025·age − 2.6           | 1.5   |
//! | PEF (L/min) | 5.5·h_cm − 1.5·\|age−30\| − 80    | 4.2·h_cm − 1.2·\|age−30\| − 50       | 200   |
//!
//! No state, no I/O.

use respira_contracts::{
    assessment::ClinicalBaseline,
    error::{RespiraError, RespiraResult},
    patient::{Gender, PatientObservation},
};

/// BMI reported when height or weight is unusable.
pub const DEFAULT_BMI: f64 = 22.0;

/// Lowest predicted FEV1 the equations may report, in liters.
pub const MIN_PREDICTED_FEV1: f64 = 1.5;

/// Lowest predicted PEF the equations may report, in L/min.
pub const MIN_PREDICTED_PEF: u32 = 200;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Body-mass index rounded to one decimal.
///
/// Returns [`DEFAULT_BMI`] when `height_cm` is not positive.
pub fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    if height_cm <= 0.0 || !height_cm.is_finite() || !weight_kg.is_finite() {
        return DEFAULT_BMI;
    }
    let height_m = height_cm / 100.0;
    round_to(weight_kg / (height_m * height_m), 1)
}

/// [`bmi`] for optional intake fields; either one missing yields the default.
pub fn bmi_or_default(weight_kg: Option<f64>, height_cm: Option<f64>) -> f64 {
    match (weight_kg, height_cm) {
        (Some(weight), Some(height)) => bmi(weight, height),
        _ => DEFAULT_BMI,
    }
}

fn require_demographics(age: Option<u32>, height_cm: Option<f64>) -> RespiraResult<(f64, f64)> {
    match (age, height_cm) {
        (Some(age), Some(height)) if height.is_finite() => Ok((f64::from(age), height)),
        (None, _) => Err(RespiraError::InvalidInput {
            reason: "age is required for predicted lung function".to_string(),
        }),
        _ => Err(RespiraError::InvalidInput {
            reason: "height is required for predicted lung function".to_string(),
        }),
    }
}

/// Predicted FEV1 in liters, rounded to two decimals and floored at 1.5 L.
///
/// # Errors
///
/// `InvalidInput` when age or height is missing.
pub fn predicted_fev1(age: Option<u32>, height_cm: Option<f64>, gender: Gender) -> RespiraResult<f64> {
    let (age, height_cm) = require_demographics(age, height_cm)?;
    let height_m = height_cm / 100.0;

    let predicted = match gender {
        Gender::Male => 4.3 * height_m - 0.029 * age - 2.0,
        Gender::Female => 3.95 * height_m - 0.025 * age - 2.6,
    };
    Ok(round_to(predicted, 2).max(MIN_PREDICTED_FEV1))
}

/// Predicted peak expiratory flow in L/min, truncated and floored at 200.
///
/// Peak flow is modelled as maximal around age 30 and declining on both
/// sides of it.
///
/// # Errors
///
/// `InvalidInput` when age or height is missing.
pub fn predicted_pef(age: Option<u32>, height_cm: Option<f64>, gender: Gender) -> RespiraResult<u32> {
    let (age, height_cm) = require_demographics(age, height_cm)?;
    let age_delta = (age - 30.0).abs();

    let predicted = match gender {
        Gender::Male => 5.5 * height_cm - 1.5 * age_delta - 80.0,
        Gender::Female => 4.2 * height_cm - 1.2 * age_delta - 50.0,
    };
    // Truncation toward zero; negative values saturate to 0 before the floor.
    Ok((predicted.trunc() as u32).max(MIN_PREDICTED_PEF))
}

/// `observed / predicted × 100`, rounded to one decimal.
pub fn percent_predicted(observed: f64, predicted: f64) -> f64 {
    if predicted <= 0.0 {
        return 0.0;
    }
    round_to(observed / predicted * 100.0, 1)
}

/// Predicted FEV1/PEF and percent-predicted values for one observation.
///
/// # Errors
///
/// `InvalidInput` when the observation has no height.
pub fn baseline(observation: &PatientObservation) -> RespiraResult<ClinicalBaseline> {
    let age = Some(observation.age);
    let predicted_fev1 = predicted_fev1(age, observation.height_cm, observation.gender)?;
    let predicted_pef = predicted_pef(age, observation.height_cm, observation.gender)?;

    Ok(ClinicalBaseline {
        predicted_fev1,
        predicted_pef,
        fev1_pct: percent_predicted(observation.fev1_liters, predicted_fev1),
        pef_pct: percent_predicted(observation.pef_lpm, f64::from(predicted_pef)),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
