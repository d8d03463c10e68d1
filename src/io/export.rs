//! CSV exports for downstream consumers.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::domain::{BandTable, Grade};
use crate::error::AppError;
use crate::io::table::{TableLayout, write_table_file};
use crate::report::metrics::EmployeeMetrics;

/// Write the pay-range table (highest grade first, full precision).
pub fn write_bands_csv(path: &Path, table: &BandTable) -> Result<(), AppError> {
    write_table_file(path, table, TableLayout::Export)
}

#[derive(Debug, Serialize)]
struct EmployeeMetricsRecord<'a> {
    #[serde(rename = "Employee ID")]
    id: &'a str,
    #[serde(rename = "Job")]
    job: &'a str,
    #[serde(rename = "Grade")]
    grade: Grade,
    #[serde(rename = "Gender")]
    gender: &'a str,
    #[serde(rename = "Base Pay")]
    pay: f64,
    #[serde(rename = "Range Min")]
    range_min: f64,
    #[serde(rename = "Range Mid")]
    range_mid: f64,
    #[serde(rename = "Range Max")]
    range_max: f64,
    #[serde(rename = "Compa-Ratio")]
    compa_ratio: f64,
    #[serde(rename = "Range Penetration")]
    range_penetration: Option<f64>,
    #[serde(rename = "Below Min")]
    below_min: bool,
    #[serde(rename = "Above Max")]
    above_max: bool,
}

/// Write per-employee alignment metrics, in input order.
pub fn write_employee_metrics_csv(path: &Path, rows: &[EmployeeMetrics]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut wtr = csv::Writer::from_writer(file);
    for r in rows {
        wtr.serialize(EmployeeMetricsRecord {
            id: r.id.as_deref().unwrap_or(""),
            job: r.job.as_deref().unwrap_or(""),
            grade: r.grade,
            gender: r.gender.as_deref().unwrap_or(""),
            pay: r.pay,
            range_min: r.range_min,
            range_mid: r.range_mid,
            range_max: r.range_max,
            compa_ratio: r.compa_ratio,
            range_penetration: r.range_penetration,
            below_min: r.below_min,
            above_max: r.above_max,
        })
        .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::input(format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}
