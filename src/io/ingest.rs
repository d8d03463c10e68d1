//! CSV ingest and normalization.
//!
//! This module is responsible for turning an uploaded pay file into a clean set
//! of `(grade, pay, metadata)` rows that are safe to aggregate.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (drop bad rows, but report what happened)
//! - **Deterministic behavior** (row order is preserved)
//! - **Separation of concerns**: no derivation logic here

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{Employee, Grade, Observation, PayColumn};
use crate::error::AppError;
use crate::math::min_max;

/// Summary stats about the rows actually used.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub n_rows: usize,
    pub n_grades: usize,
    pub grade_min: Grade,
    pub grade_max: Grade,
    pub pay_min: f64,
    pub pay_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Ingest output: validated rows + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub employees: Vec<Employee>,
    pub pay_column: PayColumn,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

impl IngestedData {
    pub fn observations(&self) -> Vec<Observation> {
        self.employees.iter().map(Employee::observation).collect()
    }
}

/// Load and validate a pay CSV from disk.
pub fn load_employees(path: &Path, pay_column: PayColumn, min_records: usize) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;
    let data = read_employees(file, pay_column, min_records)?;
    debug!(
        path = %path.display(),
        rows_read = data.rows_read,
        rows_used = data.rows_used,
        "loaded pay file"
    );
    Ok(data)
}

/// Validate a pay CSV from any reader.
pub fn read_employees<R: Read>(reader: R, pay_column: PayColumn, min_records: usize) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(pay_column, &header_map)?;

    let mut employees = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: header line, then 1-based line numbers.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map, pay_column) {
            Ok(employee) => employees.push(employee),
            Err(message) => row_errors.push(RowError {
                line,
                id: get_optional(&record, &header_map, "employee id").map(str::to_string),
                message,
            }),
        }
    }

    if !row_errors.is_empty() {
        warn!(dropped = row_errors.len(), "dropped invalid rows from pay file");
    }

    let rows_used = employees.len();
    if rows_used == 0 {
        return Err(AppError::input("No valid rows remain after validation."));
    }
    if rows_used < min_records {
        return Err(AppError::input(format!(
            "Dataset must contain at least {min_records} valid records (found {rows_used})."
        )));
    }

    let stats = compute_stats(&employees)
        .ok_or_else(|| AppError::input("No valid rows remain after validation."))?;

    Ok(IngestedData {
        employees,
        pay_column,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn ensure_required_columns_exist(pay_column: PayColumn, header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    if !header_map.contains_key("grade") {
        return Err(AppError::input("Missing required column: `Grade`"));
    }
    let pay_key = pay_column.header().to_ascii_lowercase();
    if !header_map.contains_key(&pay_key) {
        return Err(AppError::input(format!(
            "Missing required column: `{}`",
            pay_column.header()
        )));
    }
    Ok(())
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>, pay_column: PayColumn) -> Result<Employee, String> {
    let grade = parse_grade(get_required(record, header_map, "grade")?)?;

    let pay_key = pay_column.header().to_ascii_lowercase();
    let pay_raw = get_required(record, header_map, &pay_key)?;
    let pay = parse_pay(pay_raw).ok_or_else(|| {
        format!("Invalid `{}` value '{pay_raw}' (must be a number > 0).", pay_column.header())
    })?;

    Ok(Employee {
        id: get_optional(record, header_map, "employee id").map(str::to_string),
        job: get_optional(record, header_map, "job").map(str::to_string),
        grade,
        pay,
        gender: get_optional(record, header_map, "gender").map(normalize_gender),
    })
}

fn parse_grade(s: &str) -> Result<Grade, String> {
    if let Ok(g) = s.parse::<Grade>() {
        return Ok(g);
    }
    // Spreadsheets like to write integers as `3.0`.
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => Ok(v as Grade),
        _ => Err(format!("Invalid `Grade` value '{s}' (must be an integer).")),
    }
}

/// Parse a pay amount, tolerating thousands separators and a leading currency sign.
fn parse_pay(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim_start_matches(['$', '€', '£'])
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let v = cleaned.trim().parse::<f64>().ok()?;
    (v.is_finite() && v > 0.0).then_some(v)
}

/// Title-case a gender label (`male` -> `Male`).
pub fn normalize_gender(s: &str) -> String {
    let lower = s.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn compute_stats(employees: &[Employee]) -> Option<DatasetStats> {
    let pays: Vec<f64> = employees.iter().map(|e| e.pay).collect();
    let (pay_min, pay_max) = min_max(&pays)?;
    let grades: BTreeSet<Grade> = employees.iter().map(|e| e.grade).collect();
    Some(DatasetStats {
        n_rows: employees.len(),
        n_grades: grades.len(),
        grade_min: *grades.first()?,
        grade_max: *grades.last()?,
        pay_min,
        pay_max,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}
