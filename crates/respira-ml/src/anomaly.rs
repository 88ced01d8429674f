//! Anomaly screener for submitted vitals.
//!
//! An `IsolationForest` over `[age, fev1, pef, spo2]`, fitted once at startup
//! on synthetic "normal population" data drawn from a seeded RNG, flags
//! physiologically implausible combinations. Flagged observations are
//! explained with z-scores against the same reference population.
//!
//! The screen is advisory: it never rejects a request, it only lowers trust.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::Deserialize;
use tracing::info;

use respira_contracts::{
    assessment::AnomalyVerdict,
    error::{RespiraError, RespiraResult},
    patient::PatientObservation,
};
use respira_core::traits::OutlierDetector;

use crate::isolation::{ForestParams, IsolationForest};

/// |z| above which a single measurement is named as a contributing factor.
pub const Z_THRESHOLD: f64 = 1.96;

/// Mean and standard deviation of one reference measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    pub mean: f64,
    pub sd: f64,
}

impl Reference {
    pub fn z(self, value: f64) -> f64 {
        (value - self.mean) / self.sd
    }
}

// Uniform(5, 90) has mean 47.5; 24.5 is the population SD used in reporting.
pub const AGE: Reference = Reference { mean: 47.5, sd: 24.5 };
pub const FEV1: Reference = Reference { mean: 3.5, sd: 1.2 };
pub const PEF: Reference = Reference { mean: 400.0, sd: 150.0 };
pub const SPO2: Reference = Reference { mean: 96.0, sd: 3.0 };

/// Screener settings, read from the `[anomaly]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub samples: usize,
    pub trees: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            samples: 10_000,
            trees: 100,
            contamination: 0.01,
            seed: 42,
        }
    }
}

/// Draw `n` reference rows `[age, fev1, pef, spo2]`.
pub fn reference_population(n: usize, rng: &mut StdRng) -> RespiraResult<Vec<Vec<f64>>> {
    let normal = |r: Reference| {
        Normal::new(r.mean, r.sd).map_err(|e| RespiraError::InvalidInput {
            reason: format!("invalid reference distribution: {e}"),
        })
    };
    let fev1 = normal(FEV1)?;
    let pef = normal(PEF)?;
    let spo2 = normal(SPO2)?;

    Ok((0..n)
        .map(|_| {
            vec![
                rng.gen_range(5.0..90.0),
                rng.sample(fev1).clamp(0.5, 7.0),
                rng.sample(pef).clamp(50.0, 800.0),
                rng.sample(spo2).clamp(80.0, 100.0),
            ]
        })
        .collect())
}

/// Human-readable reasons an observation deviates from the reference
/// population. Never empty: a multivariate outlier with no single extreme
/// value is reported as such.
pub fn explain_flags(observation: &PatientObservation) -> Vec<String> {
    let mut flags = Vec::new();

    let age = f64::from(observation.age);
    let z_age = AGE.z(age);
    if z_age.abs() > Z_THRESHOLD {
        let direction = if z_age > 0.0 { "Advanced" } else { "Unusually Young" };
        flags.push(format!("{direction} Age ({})", observation.age));
    }

    let z_fev1 = FEV1.z(observation.fev1_liters);
    if z_fev1.abs() > Z_THRESHOLD {
        let direction = if z_fev1 > 0.0 { "High" } else { "Extremely Low" };
        flags.push(format!("{direction} FEV1 ({}L)", observation.fev1_liters));
    }

    let z_pef = PEF.z(observation.pef_lpm);
    if z_pef.abs() > Z_THRESHOLD {
        let direction = if z_pef > 0.0 { "High" } else { "Extremely Low" };
        flags.push(format!("{direction} PEF ({}L/min)", observation.pef_lpm));
    }

    // High saturation is never a concern.
    if SPO2.z(observation.spo2_pct) < -Z_THRESHOLD {
        flags.push(format!("Critical SpO2 ({}%)", observation.spo2_pct));
    }

    if flags.is_empty() {
        flags.push("Complex Multivariate Anomaly".to_string());
    }
    flags
}

/// The fitted screener. Read-only after construction.
#[derive(Debug, Clone)]
pub struct AnomalyScreener {
    forest: IsolationForest,
}

impl AnomalyScreener {
    /// Fit on a freshly drawn reference population.
    pub fn fit(config: AnomalyConfig) -> RespiraResult<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let data = reference_population(config.samples, &mut rng)?;
        let forest = IsolationForest::fit(
            &data,
            ForestParams {
                trees: config.trees,
                contamination: config.contamination,
                seed: config.seed,
            },
        )?;
        info!(
            samples = config.samples,
            trees = config.trees,
            contamination = config.contamination,
            seed = config.seed,
            "anomaly screener fitted"
        );
        Ok(Self { forest })
    }

    fn point(observation: &PatientObservation) -> [f64; 4] {
        [
            f64::from(observation.age),
            observation.fev1_liters,
            observation.pef_lpm,
            observation.spo2_pct,
        ]
    }
}

impl OutlierDetector for AnomalyScreener {
    fn detect(&self, observation: &PatientObservation) -> AnomalyVerdict {
        let x = Self::point(observation);
        let score = self.forest.decision_function(&x);
        if score >= 0.0 {
            return AnomalyVerdict::inlier(score);
        }
        AnomalyVerdict {
            is_outlier: true,
            anomaly_score: score,
            flagged_features: explain_flags(observation),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use respira_contracts::patient::{Gender, SmokingStatus};

    use super::*;

    /// Fitting is deterministic, so one screener serves every test.
    fn screener() -> &'static AnomalyScreener {
        static SCREENER: OnceLock<AnomalyScreener> = OnceLock::new();
        SCREENER.get_or_init(|| AnomalyScreener::fit(AnomalyConfig::default()).unwrap())
    }

    fn obs(age: u32, fev1: f64, pef: f64, spo2: f64) -> PatientObservation {
        PatientObservation {
            patient_id: None,
            patient_name: "Test Patient".to_string(),
            age,
            height_cm: Some(170.0),
            weight_kg: Some(70.0),
            gender: Gender::Female,
            smoking: SmokingStatus::NonSmoker,
            fev1_liters: fev1,
            pef_lpm: pef,
            spo2_pct: spo2,
            wheezing: false,
            shortness_of_breath: false,
            postal_code: "560001".to_string(),
            medication_use: false,
        }
    }

    #[test]
    fn test_typical_adult_is_inlier() {
        let verdict = screener().detect(&obs(40, 3.5, 400.0, 96.0));
        assert!(!verdict.is_outlier);
        assert!(verdict.anomaly_score >= 0.0);
        assert!(verdict.flagged_features.is_empty());
    }

    #[test]
    fn test_extreme_combination_is_outlier() {
        let verdict = screener().detect(&obs(110, 0.5, 790.0, 80.0));
        assert!(verdict.is_outlier);
        assert!(verdict.anomaly_score < 0.0);
        assert!(!verdict.flagged_features.is_empty());
    }

    /// Age 95 gives z = 1.94, so only the lung-function values are named.
    #[test]
    fn test_elderly_with_extreme_lung_function_is_outlier() {
        let verdict = screener().detect(&obs(95, 7.5, 750.0, 99.0));
        assert!(verdict.is_outlier);
        assert!(verdict.anomaly_score < 0.0);
        assert_eq!(verdict.flagged_features, vec!["High FEV1 (7.5L)", "High PEF (750L/min)"]);
    }

    /// Same seed, same input, same verdict.
    #[test]
    fn test_fixed_seed_is_deterministic() {
        let config = AnomalyConfig {
            samples: 2_000,
            ..AnomalyConfig::default()
        };
        let a = AnomalyScreener::fit(config).unwrap();
        let b = AnomalyScreener::fit(config).unwrap();
        let extreme = obs(110, 0.5, 790.0, 80.0);
        assert_eq!(a.detect(&extreme), b.detect(&extreme));
    }

    #[test]
    fn test_reference_population_is_clipped() {
        let mut rng = StdRng::seed_from_u64(1);
        let rows = reference_population(5_000, &mut rng).unwrap();
        assert_eq!(rows.len(), 5_000);
        for row in rows {
            assert!((5.0..90.0).contains(&row[0]));
            assert!((0.5..=7.0).contains(&row[1]));
            assert!((50.0..=800.0).contains(&row[2]));
            assert!((80.0..=100.0).contains(&row[3]));
        }
    }

    // ── Explanations ─────────────────────────────────────────────────────────

    /// Age 95 sits just inside 1.96 SD; the lung-function flags still fire.
    #[test]
    fn test_flags_for_extreme_lung_function() {
        let flags = explain_flags(&obs(95, 7.5, 50.0, 97.0));
        assert_eq!(flags, vec!["High FEV1 (7.5L)", "Extremely Low PEF (50L/min)"]);
    }

    #[test]
    fn test_flags_age_direction() {
        assert_eq!(explain_flags(&obs(100, 3.5, 400.0, 96.0)), vec!["Advanced Age (100)"]);
        // z = (0 − 47.5) / 24.5 = −1.94: not flagged.
        assert_eq!(explain_flags(&obs(0, 3.5, 400.0, 96.0)), vec!["Complex Multivariate Anomaly"]);
    }

    #[test]
    fn test_only_low_spo2_is_flagged() {
        assert_eq!(explain_flags(&obs(40, 3.5, 400.0, 72.0)), vec!["Critical SpO2 (72%)"]);
        assert_eq!(explain_flags(&obs(40, 3.5, 400.0, 100.0)), vec!["Complex Multivariate Anomaly"]);
    }

    #[test]
    fn test_flags_keep_measurement_order() {
        let flags = explain_flags(&obs(100, 0.6, 750.0, 80.0));
        assert_eq!(
            flags,
            vec![
                "Advanced Age (100)",
                "Extremely Low FEV1 (0.6L)",
                "High PEF (750L/min)",
                "Critical SpO2 (80%)"
            ]
        );
    }
}
