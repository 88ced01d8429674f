//! Read-only aggregations over an `AssessmentStore`.

use std::collections::HashSet;

use respira_contracts::{
    error::RespiraResult,
    record::{AssessmentRecord, AssessmentStats, PatientReference},
};
use respira_core::traits::AssessmentStore;

/// Maximum rows returned by a patient search.
pub const PATIENT_SEARCH_LIMIT: usize = 20;
/// Rows returned by the history listing.
pub const HISTORY_LIMIT: usize = 100;
/// Records averaged for the dashboard FEV1 figure.
pub const FEV1_WINDOW: usize = 1000;
/// Scores above this count as high risk on the dashboard.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

const UNKNOWN_NAME: &str = "Unknown";

/// Distinct patients, most recently seen first.
///
/// Each patient is represented by their newest record. The name filter is
/// a case-insensitive substring match applied to that newest record, so a
/// patient whose latest name does not match is skipped even if an older
/// record would have matched.
pub fn search_patients(
    store: &dyn AssessmentStore,
    query: &str,
    limit: usize,
) -> RespiraResult<Vec<PatientReference>> {
    let needle = query.trim().to_lowercase();
    let mut seen: HashSet<String> = HashSet::new();
    let mut results = Vec::new();

    for record in store.recent(usize::MAX)? {
        let patient_id = record.patient_id();
        if patient_id.is_empty() || !seen.insert(patient_id.to_string()) {
            continue;
        }

        let mut reference = PatientReference::from(&record);
        if reference.patient_name.trim().is_empty() {
            reference.patient_name = UNKNOWN_NAME.to_string();
        }
        if needle.is_empty() || reference.patient_name.to_lowercase().contains(&needle) {
            results.push(reference);
            if results.len() == limit {
                break;
            }
        }
    }

    Ok(results)
}

/// The newest `limit` records, optionally restricted to one patient.
pub fn history(
    store: &dyn AssessmentStore,
    patient_id: Option<&str>,
    limit: usize,
) -> RespiraResult<Vec<AssessmentRecord>> {
    match patient_id {
        None => store.recent(limit),
        Some(id) => Ok(store
            .recent(usize::MAX)?
            .into_iter()
            .filter(|r| r.patient_id() == id)
            .take(limit)
            .collect()),
    }
}

/// Dashboard totals over the whole store.
///
/// `avg_fev1` is the mean over the newest `FEV1_WINDOW` records, rounded to
/// two decimals, and `0.0` for an empty store.
pub fn stats(store: &dyn AssessmentStore) -> RespiraResult<AssessmentStats> {
    let records = store.recent(usize::MAX)?;
    let high_risk_count = records
        .iter()
        .filter(|r| r.risk_score > HIGH_RISK_THRESHOLD)
        .count();

    let window = &records[..records.len().min(FEV1_WINDOW)];
    let avg_fev1 = if window.is_empty() {
        0.0
    } else {
        let mean = window.iter().map(|r| r.observation.fev1_liters).sum::<f64>() / window.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    Ok(AssessmentStats {
        total_patients: records.len(),
        high_risk_count,
        avg_fev1,
    })
}
