//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during derivation
//! - written to the workspace as flat CSV tables
//! - reloaded later for edits, aging and metrics

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Ordinal job-level identifier. Higher means more senior.
pub type Grade = i64;

/// Default band width: `(max - min) / min = 50%`, i.e. `±20%` around the midpoint.
pub const DEFAULT_SPREAD_PCT: f64 = 50.0;

/// Default minimum step between a repaired grade and the grade below it.
pub const DEFAULT_STEP_PCT: f64 = 3.0;

/// Maximum number of entries kept in the edit log.
pub const EDIT_LOG_CAPACITY: usize = 100;

/// Largest number of grades a table may span, lowest to highest inclusive.
pub const MAX_GRADE_SPAN: usize = 10_000;

/// Half-width of the window used by the density-seeking estimator (`[0.8c, 1.2c]`).
pub const DENSITY_WINDOW: f64 = 0.2;

/// Smallest candidate count accepted by the density-seeking estimator.
pub const MIN_DENSITY_CANDIDATES: usize = 100;

/// Number of grades in `lo..=hi`, refused when it overflows or exceeds
/// [`MAX_GRADE_SPAN`].
pub fn grade_span(lo: Grade, hi: Grade) -> Result<usize, AppError> {
    let span = hi
        .checked_sub(lo)
        .and_then(|d| usize::try_from(d).ok())
        .and_then(|d| d.checked_add(1))
        .filter(|&n| n <= MAX_GRADE_SPAN);
    span.ok_or_else(|| {
        AppError::input(format!(
            "Grades {lo}..{hi} span more than {MAX_GRADE_SPAN} levels; check the Grade column."
        ))
    })
}

/// Which input source the midpoints are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Market benchmark rates (`Target Pay`), typically one row per job.
    Market,
    /// Observed employee pay (`Base Pay`).
    Employee,
    /// Employee pay, midpoint taken as the lower of median and density estimate.
    Combined,
}

impl Strategy {
    pub fn display_name(self) -> &'static str {
        match self {
            Strategy::Market => "Market rates",
            Strategy::Employee => "Employee pay",
            Strategy::Combined => "Combination",
        }
    }

    pub fn pay_column(self) -> PayColumn {
        match self {
            Strategy::Market => PayColumn::TargetPay,
            Strategy::Employee | Strategy::Combined => PayColumn::BasePay,
        }
    }

    pub fn default_estimator(self) -> MidEstimator {
        match self {
            Strategy::Market => MidEstimator::Median,
            Strategy::Employee => MidEstimator::Density,
            Strategy::Combined => MidEstimator::Combined,
        }
    }

    pub fn default_min_observations(self) -> usize {
        match self {
            Strategy::Market => 1,
            Strategy::Employee | Strategy::Combined => 2,
        }
    }

    pub fn default_density_candidates(self) -> usize {
        match self {
            Strategy::Combined => 100,
            Strategy::Market | Strategy::Employee => 1000,
        }
    }
}

/// Which pay column of the input file holds the observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayColumn {
    BasePay,
    TargetPay,
}

impl PayColumn {
    /// Header as it appears in templates (matching is case-insensitive).
    pub fn header(self) -> &'static str {
        match self {
            PayColumn::BasePay => "Base Pay",
            PayColumn::TargetPay => "Target Pay",
        }
    }
}

/// How one representative midpoint is picked from a grade's observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MidEstimator {
    Median,
    Mean,
    /// Candidate midpoint covering the most observations within `±20%`.
    Density,
    /// `min(median, density)`.
    Combined,
}

/// How missing grades are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GapFillMethod {
    /// Log-linear: pay differentials compound across grades.
    Geometric,
    /// Straight-line interpolation, constant extension at the edges.
    Linear,
}

/// How the aging factor is built from an annual rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgingMode {
    /// `1 + rate * months / 12`.
    Simple,
    /// `(1 + rate) ^ (months / 12)`.
    Compound,
}

/// Provenance of a grade's midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MidSource {
    /// Estimated directly from the grade's own observations.
    Calculated,
    /// Filled from neighbouring grades.
    Interpolated,
    /// Raised by the monotonicity repair.
    Adjusted,
}

impl MidSource {
    pub fn label(self) -> &'static str {
        match self {
            MidSource::Calculated => "Calculated",
            MidSource::Interpolated => "Interpolated",
            MidSource::Adjusted => "Adjusted",
        }
    }
}

/// Field of a band that can be overridden by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum BandParam {
    #[serde(rename = "Range Mid")]
    Mid,
    #[serde(rename = "Range Spread")]
    #[value(name = "spread", alias = "spread-pct")]
    SpreadPct,
}

impl BandParam {
    pub fn label(self) -> &'static str {
        match self {
            BandParam::Mid => "Range Mid",
            BandParam::SpreadPct => "Range Spread",
        }
    }
}

/// One pay observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub grade: Grade,
    pub pay: f64,
}

/// A validated input row.
///
/// `pay` is whichever column the strategy reads (`Base Pay` or `Target Pay`).
#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    pub id: Option<String>,
    pub job: Option<String>,
    pub grade: Grade,
    pub pay: f64,
    pub gender: Option<String>,
}

impl Employee {
    pub fn observation(&self) -> Observation {
        Observation {
            grade: self.grade,
            pay: self.pay,
        }
    }
}

/// Aggregation output for one grade.
#[derive(Debug, Clone, PartialEq)]
pub struct MidEstimate {
    pub grade: Grade,
    /// `None` when the grade had too few observations.
    pub mid: Option<f64>,
    pub source: MidSource,
    pub n_obs: usize,
}

/// A grade with a resolved midpoint (after gap filling).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeMid {
    pub grade: Grade,
    pub mid: f64,
    pub source: MidSource,
}

/// One row of the pay-range table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub grade: Grade,
    pub min: f64,
    pub mid: f64,
    pub max: f64,
    pub spread_pct: f64,
    /// `(mid / mid_below - 1) * 100`; `None` for the lowest grade.
    pub mid_point_differential: Option<f64>,
    /// `(max - min_above) / (max - min) * 100`; `None` for the highest grade.
    pub range_overlap: Option<f64>,
    pub mid_source: MidSource,
}

/// The pay-range table, ordered by ascending grade.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BandTable {
    pub bands: Vec<GradeBand>,
}

impl BandTable {
    pub fn new(mut bands: Vec<GradeBand>) -> Self {
        bands.sort_by_key(|b| b.grade);
        Self { bands }
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GradeBand> {
        self.bands.iter()
    }

    pub fn position(&self, grade: Grade) -> Option<usize> {
        self.bands.binary_search_by_key(&grade, |b| b.grade).ok()
    }

    pub fn get(&self, grade: Grade) -> Option<&GradeBand> {
        self.position(grade).map(|idx| &self.bands[idx])
    }

    pub fn grade_range(&self) -> Option<(Grade, Grade)> {
        Some((self.bands.first()?.grade, self.bands.last()?.grade))
    }

    /// Midpoints keyed by grade, with their provenance.
    pub fn grade_mids(&self) -> Vec<GradeMid> {
        self.bands
            .iter()
            .map(|b| GradeMid {
                grade: b.grade,
                mid: b.mid,
                source: b.mid_source,
            })
            .collect()
    }

    /// Per-grade spreads, used to rebuild a table with the same widths.
    pub fn spreads(&self) -> BTreeMap<Grade, f64> {
        self.bands.iter().map(|b| (b.grade, b.spread_pct)).collect()
    }
}

/// Band width configuration.
///
/// Width is stored as a spread percentage (`(max - min) / min * 100`); a
/// symmetric half-width `h` (e.g. `0.2` for `±20%`) maps to `2h / (1 - h) * 100`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandWidth {
    pub spread_pct: f64,
    /// Per-grade spreads that override `spread_pct`.
    pub overrides: BTreeMap<Grade, f64>,
}

impl Default for BandWidth {
    fn default() -> Self {
        Self::uniform(DEFAULT_SPREAD_PCT)
    }
}

impl BandWidth {
    pub fn uniform(spread_pct: f64) -> Self {
        Self {
            spread_pct,
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_half_width(half_width: f64) -> Result<Self, AppError> {
        if !(half_width.is_finite() && (0.0..1.0).contains(&half_width)) {
            return Err(AppError::input(format!(
                "Invalid half-width {half_width}: must be in [0, 1)."
            )));
        }
        Ok(Self::uniform(2.0 * half_width / (1.0 - half_width) * 100.0))
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<Grade, f64>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn spread_for(&self, grade: Grade) -> f64 {
        self.overrides.get(&grade).copied().unwrap_or(self.spread_pct)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let all = std::iter::once((None, self.spread_pct))
            .chain(self.overrides.iter().map(|(g, s)| (Some(*g), *s)));
        for (grade, spread) in all {
            if !(spread.is_finite() && spread >= 0.0) {
                let which = grade.map(|g| format!(" for grade {g}")).unwrap_or_default();
                return Err(AppError::input(format!(
                    "Invalid range spread{which}: {spread} (must be finite and >= 0)."
                )));
            }
        }
        Ok(())
    }
}

/// One entry of the edit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    #[serde(rename = "Grade")]
    pub grade: Grade,
    #[serde(rename = "Parameter")]
    pub param: BandParam,
    #[serde(rename = "Current Value")]
    pub old_value: f64,
    #[serde(rename = "New Value")]
    pub new_value: f64,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Aging settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgingConfig {
    pub annual_rate_pct: f64,
    pub months: f64,
    pub mode: AgingMode,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            annual_rate_pct: 4.0,
            months: 6.0,
            mode: AgingMode::Simple,
        }
    }
}

/// A full derivation run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus strategy defaults).
#[derive(Debug, Clone)]
pub struct DeriveConfig {
    pub input_path: PathBuf,
    pub strategy: Strategy,
    pub estimator: MidEstimator,
    pub min_observations: usize,
    pub density_candidates: usize,
    pub gap_fill: GapFillMethod,
    pub step_pct: f64,
    pub width: BandWidth,
    /// Fewer valid input rows than this is a fatal input error.
    pub min_records: usize,

    pub state_dir: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub audit_dir: Option<PathBuf>,
}

impl DeriveConfig {
    /// Configuration with every knob at the strategy's defaults.
    pub fn for_strategy(strategy: Strategy, input_path: PathBuf) -> Self {
        Self {
            input_path,
            strategy,
            estimator: strategy.default_estimator(),
            min_observations: strategy.default_min_observations(),
            density_candidates: strategy.default_density_candidates(),
            gap_fill: GapFillMethod::Geometric,
            step_pct: DEFAULT_STEP_PCT,
            width: BandWidth::default(),
            min_records: 10,
            state_dir: None,
            export: None,
            audit_dir: None,
        }
    }
}
