//! Band-table CSV read/write.
//!
//! Two layouts share the same column names:
//!
//! - `State`: the workspace copy (`grade_first_cut.csv`, `grade_edited.csv`),
//!   which also carries the `Mid Calculation` provenance column
//! - `Export`: the seven-column table handed to downstream consumers
//!
//! Rows are written in descending grade order (highest grade first, the way
//! pay-range tables are usually read). Floats are written with the shortest
//! representation that round-trips, so a table read back compares equal to the
//! one that was written. Null differentials/overlaps are empty cells.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bands::derive::band_limits;
use crate::domain::{BandTable, Grade, GradeBand, MidSource};
use crate::error::AppError;

/// Relative slack allowed between stored limits and the ones implied by mid and spread.
const LIMIT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLayout {
    State,
    Export,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    #[serde(rename = "Grade")]
    grade: Grade,
    #[serde(rename = "Range Min")]
    min: f64,
    #[serde(rename = "Range Mid")]
    mid: f64,
    #[serde(rename = "Range Max")]
    max: f64,
    #[serde(rename = "Range Spread")]
    spread_pct: f64,
    #[serde(rename = "Mid Point Differential")]
    mid_point_differential: Option<f64>,
    #[serde(rename = "Range Overlap")]
    range_overlap: Option<f64>,
    #[serde(rename = "Mid Calculation")]
    mid_source: MidSource,
}

#[derive(Debug, Serialize)]
struct ExportRecord {
    #[serde(rename = "Grade")]
    grade: Grade,
    #[serde(rename = "Range Min")]
    min: f64,
    #[serde(rename = "Range Mid")]
    mid: f64,
    #[serde(rename = "Range Max")]
    max: f64,
    #[serde(rename = "Range Spread")]
    spread_pct: f64,
    #[serde(rename = "Mid Point Differential")]
    mid_point_differential: Option<f64>,
    #[serde(rename = "Range Overlap")]
    range_overlap: Option<f64>,
}

impl From<&GradeBand> for StateRecord {
    fn from(b: &GradeBand) -> Self {
        Self {
            grade: b.grade,
            min: b.min,
            mid: b.mid,
            max: b.max,
            spread_pct: b.spread_pct,
            mid_point_differential: b.mid_point_differential,
            range_overlap: b.range_overlap,
            mid_source: b.mid_source,
        }
    }
}

impl From<&GradeBand> for ExportRecord {
    fn from(b: &GradeBand) -> Self {
        Self {
            grade: b.grade,
            min: b.min,
            mid: b.mid,
            max: b.max,
            spread_pct: b.spread_pct,
            mid_point_differential: b.mid_point_differential,
            range_overlap: b.range_overlap,
        }
    }
}

impl From<StateRecord> for GradeBand {
    fn from(r: StateRecord) -> Self {
        Self {
            grade: r.grade,
            min: r.min,
            mid: r.mid,
            max: r.max,
            spread_pct: r.spread_pct,
            mid_point_differential: r.mid_point_differential,
            range_overlap: r.range_overlap,
            mid_source: r.mid_source,
        }
    }
}

/// Write a band table as CSV to any writer.
pub fn write_table<W: Write>(writer: W, table: &BandTable, layout: TableLayout) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for band in table.iter().rev() {
        let res = match layout {
            TableLayout::State => wtr.serialize(StateRecord::from(band)),
            TableLayout::Export => wtr.serialize(ExportRecord::from(band)),
        };
        res.map_err(|e| AppError::input(format!("Failed to write band table row: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::input(format!("Failed to flush band table: {e}")))?;
    Ok(())
}

pub fn write_table_file(path: &Path, table: &BandTable, layout: TableLayout) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    write_table(file, table, layout)
}

/// Read a state-layout band table.
///
/// Rows may come in any order; the result is sorted by ascending grade.
/// Grades must be contiguous and each row's limits must agree with its mid
/// and spread.
pub fn read_table<R: Read>(reader: R) -> Result<BandTable, AppError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut bands = Vec::new();
    let mut seen = BTreeSet::new();
    for (idx, result) in rdr.deserialize::<StateRecord>().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::input(format!("Invalid band table row {line}: {e}")))?;
        if !seen.insert(record.grade) {
            return Err(AppError::input(format!(
                "Duplicate grade {} in band table (line {line}).",
                record.grade
            )));
        }
        if !(record.mid.is_finite() && record.mid > 0.0) {
            return Err(AppError::input(format!(
                "Invalid `Range Mid` {} for grade {} (line {line}).",
                record.mid, record.grade
            )));
        }
        if !(record.spread_pct.is_finite() && record.spread_pct >= 0.0) {
            return Err(AppError::input(format!(
                "Invalid `Range Spread` {} for grade {} (line {line}).",
                record.spread_pct, record.grade
            )));
        }
        let (min, max) = band_limits(record.mid, record.spread_pct);
        if !(close(record.min, min) && close(record.max, max)) {
            return Err(AppError::input(format!(
                "Grade {} limits {}..{} do not match mid {} at {}% spread (expected {min}..{max}, line {line}).",
                record.grade, record.min, record.max, record.mid, record.spread_pct
            )));
        }
        bands.push(GradeBand::from(record));
    }

    if bands.is_empty() {
        return Err(AppError::input("Band table is empty."));
    }
    let table = BandTable::new(bands);
    if let Some(w) = table.bands.windows(2).find(|w| w[0].grade.checked_add(1) != Some(w[1].grade)) {
        return Err(AppError::input(format!(
            "Band table skips grades between {} and {}; every grade in range needs a row.",
            w[0].grade, w[1].grade
        )));
    }
    Ok(table)
}

fn close(stored: f64, expected: f64) -> bool {
    stored.is_finite() && (stored - expected).abs() <= LIMIT_TOLERANCE * expected.abs()
}

pub fn read_table_file(path: &Path) -> Result<BandTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open band table '{}': {e}", path.display())))?;
    read_table(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::derive::derive_bands;
    use crate::domain::{BandWidth, GradeMid};

    fn table() -> BandTable {
        let mids = [
            GradeMid { grade: 1, mid: 41_234.567_891, source: MidSource::Calculated },
            GradeMid { grade: 2, mid: 47_000.1, source: MidSource::Interpolated },
            GradeMid { grade: 3, mid: 58_000.0 + 1.0 / 3.0, source: MidSource::Adjusted },
        ];
        derive_bands(&mids, &BandWidth::uniform(37.5)).unwrap()
    }

    #[test]
    fn state_layout_round_trips_exactly() {
        let t = table();
        let mut buf = Vec::new();
        write_table(&mut buf, &t, TableLayout::State).unwrap();
        let back = read_table(buf.as_slice()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn export_is_descending_with_empty_nulls() {
        let mut buf = Vec::new();
        write_table(&mut buf, &table(), TableLayout::Export).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Grade,Range Min,Range Mid,Range Max,Range Spread,Mid Point Differential,Range Overlap"
        );
        assert!(lines[1].starts_with("3,"));
        assert!(lines[1].ends_with(','), "top grade has no overlap: {}", lines[1]);
        assert!(lines[3].starts_with("1,"));
        assert_eq!(lines[3].split(',').nth(5), Some(""));
    }

    #[test]
    fn rejects_duplicate_grades() {
        let csv = "Grade,Range Min,Range Mid,Range Max,Range Spread,Mid Point Differential,Range Overlap,Mid Calculation\n\
            1,80,100,120,50,,80,Calculated\n\
            1,80,100,120,50,,,Calculated\n";
        let err = read_table(csv.as_bytes()).unwrap_err();
        assert!(err.message().contains("Duplicate grade 1"));
    }

    #[test]
    fn rejects_missing_grades() {
        let csv = "Grade,Range Min,Range Mid,Range Max,Range Spread,Mid Point Differential,Range Overlap,Mid Calculation\n\
            3,80,100,120,50,,,Calculated\n\
            1,80,100,120,50,,,Calculated\n";
        let err = read_table(csv.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("between 1 and 3"), "{}", err.message());
    }

    #[test]
    fn rejects_limits_that_disagree_with_mid_and_spread() {
        let csv = "Grade,Range Min,Range Mid,Range Max,Range Spread,Mid Point Differential,Range Overlap,Mid Calculation\n\
            1,90,100,120,50,,,Calculated\n";
        let err = read_table(csv.as_bytes()).unwrap_err();
        assert!(err.message().contains("do not match"), "{}", err.message());
    }

    #[test]
    fn aged_limits_are_still_accepted() {
        let mut t = table();
        for band in &mut t.bands {
            band.min *= 1.0375;
            band.mid *= 1.0375;
            band.max *= 1.0375;
        }
        let mut buf = Vec::new();
        write_table(&mut buf, &t, TableLayout::State).unwrap();
        assert_eq!(read_table(buf.as_slice()).unwrap(), t);
    }

    #[test]
    fn rejects_empty_table() {
        let csv = "Grade,Range Min,Range Mid,Range Max,Range Spread,Mid Point Differential,Range Overlap,Mid Calculation\n";
        assert_eq!(read_table(csv.as_bytes()).unwrap_err().exit_code(), 2);
    }
}
