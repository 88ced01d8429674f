//! Synthetic training cohort.
//!
//! Risk in this cohort is driven by percent-predicted lung function rather
//! than raw values: each patient gets a predicted baseline from the clinical
//! equations and a "health factor" that scales it.
//!
//! 1. Demographics: age 18–89, sex, height/weight by sex, smoking
//!    (never/ex/current at 50/30/20%), wheezing at 20%.
//! 2. Health factor ~ N(1.0, 0.15), reduced by pollution above 60, current
//!    smoking and wheezing, plus a 20% sick sub-cohort. Clamped to [0.2, 1.2].
//! 3. Observed FEV1/PEF = predicted × health factor.
//! 4. SpO2 stays high until obstruction is severe.
//! 5. Label probability from GOLD-style FEV1% bands, hypoxia and pollution.

use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use respira_contracts::{
    error::{RespiraError, RespiraResult},
    patient::Gender,
};
use respira_core::clinical;

/// One generated row, keyed by training column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRecord {
    #[serde(rename = "Age")]
    pub age: u32,
    #[serde(rename = "Gender")]
    pub gender: u8,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "Smoking")]
    pub smoking: u8,
    #[serde(rename = "Wheezing")]
    pub wheezing: u8,
    #[serde(rename = "FEV1")]
    pub fev1: f64,
    #[serde(rename = "PEF")]
    pub pef: u32,
    #[serde(rename = "FEV1_Pct")]
    pub fev1_pct: f64,
    #[serde(rename = "PEF_Pct")]
    pub pef_pct: f64,
    #[serde(rename = "SpO2")]
    pub spo2: u32,
    #[serde(rename = "Pollution")]
    pub pollution: u32,
    #[serde(rename = "Diagnosis")]
    pub diagnosis: u8,
}

/// GOLD-style label probability for one patient.
pub fn label_probability(fev1_pct: f64, spo2: u32, pollution: u32) -> f64 {
    let mut risk: f64 = if fev1_pct < 30.0 {
        0.95
    } else if fev1_pct < 50.0 {
        0.8
    } else if fev1_pct < 80.0 {
        0.3
    } else {
        0.0
    };

    // Hypoxia is an immediate trigger.
    if spo2 < 90 {
        risk = 0.99;
    } else if spo2 < 94 {
        risk += 0.4;
    }

    if pollution > 70 {
        risk += 0.1;
    }
    risk.min(0.99)
}

/// A seeded cohort generator.
pub struct CohortGenerator {
    rng: StdRng,
    smoking: WeightedIndex<f64>,
    health: Normal<f64>,
}

impl CohortGenerator {
    pub fn new(seed: u64) -> RespiraResult<Self> {
        let smoking = WeightedIndex::new([0.5, 0.3, 0.2]).map_err(|e| RespiraError::InvalidInput {
            reason: format!("invalid smoking weights: {e}"),
        })?;
        let health = Normal::new(1.0, 0.15).map_err(|e| RespiraError::InvalidInput {
            reason: format!("invalid health distribution: {e}"),
        })?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            smoking,
            health,
        })
    }

    fn normal(&mut self, mean: f64, sd: f64) -> RespiraResult<f64> {
        let dist = Normal::new(mean, sd).map_err(|e| RespiraError::InvalidInput {
            reason: format!("invalid normal({mean}, {sd}): {e}"),
        })?;
        Ok(self.rng.sample(dist))
    }

    /// Generate one patient.
    pub fn record(&mut self) -> RespiraResult<CohortRecord> {
        // ── Demographics ─────────────────────────────────────────────────────
        let age: u32 = self.rng.gen_range(18..90);
        let gender = if self.rng.gen_bool(0.5) { Gender::Female } else { Gender::Male };
        let (height_mean, weight_mean) = match gender {
            Gender::Male => (175.0, 80.0),
            Gender::Female => (162.0, 65.0),
        };
        let height = self.normal(height_mean, 10.0)?;
        let weight = self.normal(weight_mean, 15.0)?;
        let bmi = clinical::bmi(weight, height);
        let smoking = self.rng.sample(&self.smoking) as u8;
        let wheezing = self.rng.gen_bool(0.2);

        // ── Baselines ────────────────────────────────────────────────────────
        let predicted_fev1 = clinical::predicted_fev1(Some(age), Some(height), gender)?;
        let predicted_pef = clinical::predicted_pef(Some(age), Some(height), gender)?;

        // ── Health simulation ────────────────────────────────────────────────
        let mut health = self.rng.sample(self.health);
        let pollution: u32 = self.rng.gen_range(0..100);
        if pollution > 60 {
            health -= self.rng.gen_range(0.0..0.1);
        }
        if smoking == 2 {
            health -= self.rng.gen_range(0.1..0.3);
        }
        if wheezing {
            health -= 0.15;
        }
        if self.rng.gen_bool(0.2) {
            health -= self.rng.gen_range(0.2..0.5);
        }
        let health = health.clamp(0.2, 1.2);

        // ── Observed values ──────────────────────────────────────────────────
        let fev1 = (predicted_fev1 * health * 100.0).round() / 100.0;
        let pef = (f64::from(predicted_pef) * health) as u32;
        let fev1_pct = clinical::percent_predicted(fev1, predicted_fev1);
        let pef_pct = clinical::percent_predicted(f64::from(pef), f64::from(predicted_pef));

        let spo2: u32 = if fev1_pct < 50.0 {
            self.rng.gen_range(85..94)
        } else if fev1_pct < 80.0 {
            self.rng.gen_range(92..97)
        } else {
            self.rng.gen_range(96..100)
        };

        // ── Label ────────────────────────────────────────────────────────────
        let risk = label_probability(fev1_pct, spo2, pollution);
        let mut diagnosis = u8::from(self.rng.gen::<f64>() < risk);
        if risk > 0.7 {
            diagnosis = 1;
        }

        Ok(CohortRecord {
            age,
            gender: gender.model_code(),
            bmi,
            smoking,
            wheezing: u8::from(wheezing),
            fev1,
            pef,
            fev1_pct,
            pef_pct,
            spo2,
            pollution,
            diagnosis,
        })
    }

    /// Generate `n` patients.
    pub fn generate(&mut self, n: usize) -> RespiraResult<Vec<CohortRecord>> {
        (0..n).map(|_| self.record()).collect()
    }
}
