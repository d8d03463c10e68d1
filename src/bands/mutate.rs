//! Manual band overrides with incremental recompute and single-step undo.
//!
//! An edit to grade `g` touches exactly:
//!
//! - `g`: the edited field, `min`, `max`, `range_overlap`, and its own
//!   `mid_point_differential` when `mid` changed
//! - `g+1`: `mid_point_differential` (only when `mid` changed)
//! - `g-1`: `range_overlap`
//!
//! Every other row is left bit-for-bit identical. Failed edits leave both the
//! table and the log untouched.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::{info, warn};

use crate::bands::derive::{band_limits, mid_point_differential, range_overlap, rederive};
use crate::domain::{BandParam, BandTable, EDIT_LOG_CAPACITY, EditRecord, Grade};
use crate::error::AppError;

/// Append-only edit history, bounded to the most recent entries.
#[derive(Debug, Clone, PartialEq)]
pub struct EditLog {
    entries: VecDeque<EditRecord>,
    capacity: usize,
}

impl Default for EditLog {
    fn default() -> Self {
        Self::with_capacity(EDIT_LOG_CAPACITY)
    }
}

impl EditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild a log from persisted entries (oldest first), keeping the newest ones.
    pub fn from_entries(entries: Vec<EditRecord>) -> Self {
        let mut log = Self::default();
        for entry in entries {
            log.push(entry);
        }
        log
    }

    pub fn push(&mut self, entry: EditRecord) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn last(&self) -> Option<&EditRecord> {
        self.entries.back()
    }

    pub fn pop(&mut self) -> Option<EditRecord> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &EditRecord> {
        self.entries.iter()
    }
}

/// Working table plus the first cut it started from and its edit history.
#[derive(Debug, Clone, PartialEq)]
pub struct BandEditor {
    first_cut: BandTable,
    working: BandTable,
    log: EditLog,
}

impl BandEditor {
    /// Start editing a freshly derived table.
    pub fn new(first_cut: BandTable) -> Self {
        Self {
            working: first_cut.clone(),
            first_cut,
            log: EditLog::default(),
        }
    }

    pub fn from_parts(first_cut: BandTable, working: BandTable, log: EditLog) -> Self {
        Self {
            first_cut,
            working,
            log,
        }
    }

    pub fn table(&self) -> &BandTable {
        &self.working
    }

    pub fn first_cut(&self) -> &BandTable {
        &self.first_cut
    }

    pub fn log(&self) -> &EditLog {
        &self.log
    }

    /// Override one field of one grade and record the change.
    pub fn apply(&mut self, grade: Grade, param: BandParam, value: f64) -> Result<EditRecord, AppError> {
        let old_value = set_band_param(&mut self.working, grade, param, value)?;
        let record = EditRecord {
            grade,
            param,
            old_value,
            new_value: value,
            timestamp: Utc::now(),
        };
        info!(grade, param = param.label(), old_value, new_value = value, "applied band edit");
        self.log.push(record.clone());
        Ok(record)
    }

    /// Revert the most recent edit. The entry is only removed if the revert succeeds.
    pub fn undo_last(&mut self) -> Result<EditRecord, AppError> {
        let Some(last) = self.log.last().cloned() else {
            return Err(AppError::rejected_edit("No changes to reset."));
        };
        set_band_param(&mut self.working, last.grade, last.param, last.old_value)?;
        self.log.pop();
        info!(grade = last.grade, param = last.param.label(), restored = last.old_value, "reverted band edit");
        Ok(last)
    }

    /// Discard every edit and rebuild the working table from the first cut.
    pub fn reset_all(&mut self) -> Result<(), AppError> {
        let rebuilt = rederive(&self.first_cut)?;
        let dropped = self.log.len();
        self.working = rebuilt;
        self.log.clear();
        info!(dropped, "reset all band edits");
        Ok(())
    }
}

/// Set `param` on `grade` and refresh the dependent neighbour fields.
///
/// Returns the previous value. Validation happens before anything is written.
pub fn set_band_param(table: &mut BandTable, grade: Grade, param: BandParam, value: f64) -> Result<f64, AppError> {
    let idx = table
        .position(grade)
        .ok_or_else(|| AppError::rejected_edit(format!("Grade {grade} not found in the pay range table.")))?;
    validate_value(param, value)?;

    let band = &mut table.bands[idx];
    let old = match param {
        BandParam::Mid => std::mem::replace(&mut band.mid, value),
        BandParam::SpreadPct => std::mem::replace(&mut band.spread_pct, value),
    };
    let (min, max) = band_limits(band.mid, band.spread_pct);
    band.min = min;
    band.max = max;

    let n = table.bands.len();
    if param == BandParam::Mid && idx > 0 {
        let lower_mid = table.bands[idx - 1].mid;
        let b = &mut table.bands[idx];
        b.mid_point_differential = mid_point_differential(b.mid, lower_mid);
    }
    if param == BandParam::Mid && idx + 1 < n {
        let lower_mid = table.bands[idx].mid;
        let upper = &mut table.bands[idx + 1];
        upper.mid_point_differential = mid_point_differential(upper.mid, lower_mid);
    }
    if idx + 1 < n {
        let next_min = table.bands[idx + 1].min;
        let b = &mut table.bands[idx];
        b.range_overlap = range_overlap(b.min, b.max, next_min);
    }
    if idx > 0 {
        let this_min = table.bands[idx].min;
        let lower = &mut table.bands[idx - 1];
        lower.range_overlap = range_overlap(lower.min, lower.max, this_min);
    }

    if param == BandParam::Mid {
        warn_on_inversion(table, idx);
    }
    Ok(old)
}

fn validate_value(param: BandParam, value: f64) -> Result<(), AppError> {
    if !value.is_finite() {
        return Err(AppError::rejected_edit(format!("{} must be a finite number.", param.label())));
    }
    match param {
        BandParam::Mid if value <= 0.0 => Err(AppError::rejected_edit("Range Mid must be > 0.")),
        BandParam::SpreadPct if value < 0.0 => Err(AppError::rejected_edit("Range Spread must be >= 0.")),
        _ => Ok(()),
    }
}

fn warn_on_inversion(table: &BandTable, idx: usize) {
    let band = &table.bands[idx];
    if idx > 0 && table.bands[idx - 1].mid >= band.mid {
        warn!(grade = band.grade, "edited midpoint is not above the grade below");
    }
    if let Some(upper) = table.bands.get(idx + 1) {
        if upper.mid <= band.mid {
            warn!(grade = band.grade, "edited midpoint is not below the grade above");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::derive::derive_bands;
    use crate::domain::{BandWidth, GradeMid, MidSource};

    fn table(values: &[f64]) -> BandTable {
        let mids: Vec<GradeMid> = values
            .iter()
            .enumerate()
            .map(|(i, &mid)| GradeMid {
                grade: i as i64 + 1,
                mid,
                source: MidSource::Calculated,
            })
            .collect();
        derive_bands(&mids, &BandWidth::default()).unwrap()
    }

    #[test]
    fn mid_edit_touches_only_neighbours() {
        let before = table(&[100.0, 110.0, 121.0, 133.0, 146.0]);
        let mut editor = BandEditor::new(before.clone());
        editor.apply(3, BandParam::Mid, 125.0).unwrap();
        let after = editor.table();

        assert_eq!(after.bands[0], before.bands[0]);
        assert_eq!(after.bands[4], before.bands[4]);

        let g3 = &after.bands[2];
        assert_eq!(g3.mid, 125.0);
        assert!((g3.min - 100.0).abs() < 1e-9);
        assert!((g3.max - 150.0).abs() < 1e-9);
        let own = (125.0 / 110.0 - 1.0) * 100.0;
        assert!((g3.mid_point_differential.unwrap() - own).abs() < 1e-9);

        let g4 = &after.bands[3];
        let expected = (133.0 / 125.0 - 1.0) * 100.0;
        assert!((g4.mid_point_differential.unwrap() - expected).abs() < 1e-9);
        assert_eq!(g4.range_overlap, before.bands[3].range_overlap);

        let g2 = &after.bands[1];
        assert_ne!(g2.range_overlap, before.bands[1].range_overlap);
        assert_eq!(g2.mid_point_differential, before.bands[1].mid_point_differential);

        // Matches a full recompute of the edited table.
        assert_eq!(&rederive(after).unwrap(), after);
    }

    #[test]
    fn spread_edit_leaves_differentials_alone() {
        let before = table(&[100.0, 110.0, 121.0]);
        let mut editor = BandEditor::new(before.clone());
        editor.apply(2, BandParam::SpreadPct, 60.0).unwrap();
        let after = editor.table();

        for (a, b) in after.bands.iter().zip(&before.bands) {
            assert_eq!(a.mid_point_differential, b.mid_point_differential);
        }
        let g2 = &after.bands[1];
        assert_eq!(g2.spread_pct, 60.0);
        assert!(((g2.max - g2.min) / g2.min * 100.0 - 60.0).abs() < 1e-9);
        assert_ne!(after.bands[0].range_overlap, before.bands[0].range_overlap);
        assert_eq!(after.bands[2], before.bands[2]);
    }

    #[test]
    fn undo_restores_the_exact_table() {
        let before = table(&[100.0, 103.0, 150.0, 154.5]);
        let mut editor = BandEditor::new(before.clone());
        editor.apply(2, BandParam::Mid, 120.0).unwrap();
        editor.apply(4, BandParam::SpreadPct, 35.0).unwrap();
        assert_eq!(editor.log().len(), 2);

        let undone = editor.undo_last().unwrap();
        assert_eq!(undone.grade, 4);
        editor.undo_last().unwrap();
        assert_eq!(editor.table(), &before);
        assert!(editor.log().is_empty());
    }

    #[test]
    fn undo_with_empty_log_is_rejected() {
        let mut editor = BandEditor::new(table(&[100.0, 110.0]));
        let err = editor.undo_last().unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn reset_all_returns_to_first_cut() {
        let before = table(&[100.0, 110.0, 121.0]);
        let mut editor = BandEditor::new(before.clone());
        editor.apply(1, BandParam::Mid, 90.0).unwrap();
        editor.apply(3, BandParam::SpreadPct, 70.0).unwrap();
        editor.reset_all().unwrap();
        assert_eq!(editor.table(), &before);
        assert!(editor.log().is_empty());
    }

    #[test]
    fn failed_edits_change_nothing() {
        let before = table(&[100.0, 110.0]);
        let mut editor = BandEditor::new(before.clone());
        assert_eq!(editor.apply(9, BandParam::Mid, 100.0).unwrap_err().exit_code(), 5);
        assert!(editor.apply(1, BandParam::Mid, f64::NAN).is_err());
        assert!(editor.apply(1, BandParam::Mid, -1.0).is_err());
        assert!(editor.apply(1, BandParam::SpreadPct, -1.0).is_err());
        assert_eq!(editor.table(), &before);
        assert!(editor.log().is_empty());
    }

    #[test]
    fn zero_spread_nulls_the_overlap() {
        let mut editor = BandEditor::new(table(&[100.0, 110.0]));
        editor.apply(1, BandParam::SpreadPct, 0.0).unwrap();
        assert_eq!(editor.table().bands[0].range_overlap, None);
    }

    #[test]
    fn log_keeps_the_newest_hundred() {
        let mut editor = BandEditor::new(table(&[100.0, 110.0]));
        for i in 0..(EDIT_LOG_CAPACITY + 5) {
            editor.apply(2, BandParam::Mid, 110.0 + i as f64).unwrap();
        }
        assert_eq!(editor.log().len(), EDIT_LOG_CAPACITY);
        let oldest = editor.log().iter().next().unwrap();
        assert_eq!(oldest.new_value, 115.0);
    }
}
