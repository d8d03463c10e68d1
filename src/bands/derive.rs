//! Band derivation and the relational metrics between adjacent grades.
//!
//! With `s = spread_pct / 100`:
//!
//! ```text
//! min = 2 * mid / (2 + s)
//! max = min * (1 + s)
//! ```
//!
//! so `mid` is always the centre of `[min, max]` and `(max - min) / min = s`.
//! For `s = 0.5` this is the familiar `0.8 * mid .. 1.2 * mid`.
//!
//! The same helpers are used by the editor, so incremental recomputes match a
//! full derivation exactly.

use crate::domain::{BandTable, BandWidth, GradeBand, GradeMid};
use crate::error::AppError;

/// Band limits for a midpoint and spread percentage.
pub fn band_limits(mid: f64, spread_pct: f64) -> (f64, f64) {
    let s = spread_pct / 100.0;
    let min = 2.0 * mid / (2.0 + s);
    (min, min * (1.0 + s))
}

/// `(mid / lower_mid - 1) * 100`, or `None` when undefined.
pub fn mid_point_differential(mid: f64, lower_mid: f64) -> Option<f64> {
    if lower_mid == 0.0 {
        return None;
    }
    finite((mid / lower_mid - 1.0) * 100.0)
}

/// `(max - next_min) / (max - min) * 100`, or `None` for a zero-width band.
///
/// Negative values mean there is a gap between the two bands; they are kept.
pub fn range_overlap(min: f64, max: f64, next_min: f64) -> Option<f64> {
    let width = max - min;
    if width == 0.0 {
        return None;
    }
    finite((max - next_min) / width * 100.0)
}

/// Expand final midpoints into the band table.
pub fn derive_bands(mids: &[GradeMid], width: &BandWidth) -> Result<BandTable, AppError> {
    width.validate()?;
    if mids.is_empty() {
        return Err(AppError::insufficient_data("No grades to derive bands for."));
    }

    let mut sorted = mids.to_vec();
    sorted.sort_by_key(|m| m.grade);
    if let Some(pair) = sorted.windows(2).find(|p| p[0].grade == p[1].grade) {
        return Err(AppError::input(format!("Duplicate grade {} in midpoints.", pair[0].grade)));
    }

    let bands = sorted
        .iter()
        .map(|m| {
            let spread_pct = width.spread_for(m.grade);
            let (min, max) = band_limits(m.mid, spread_pct);
            GradeBand {
                grade: m.grade,
                min,
                mid: m.mid,
                max,
                spread_pct,
                mid_point_differential: None,
                range_overlap: None,
                mid_source: m.source,
            }
        })
        .collect();

    let mut table = BandTable { bands };
    refresh_relations(&mut table);
    Ok(table)
}

/// Rebuild a table from its own midpoints and spreads.
pub fn rederive(table: &BandTable) -> Result<BandTable, AppError> {
    let width = BandWidth::default().with_overrides(table.spreads());
    derive_bands(&table.grade_mids(), &width)
}

/// Recompute differential and overlap for every row.
pub fn refresh_relations(table: &mut BandTable) {
    let n = table.bands.len();
    for i in 0..n {
        let differential = if i > 0 {
            mid_point_differential(table.bands[i].mid, table.bands[i - 1].mid)
        } else {
            None
        };
        let overlap = if i + 1 < n {
            let b = &table.bands[i];
            range_overlap(b.min, b.max, table.bands[i + 1].min)
        } else {
            None
        };
        table.bands[i].mid_point_differential = differential;
        table.bands[i].range_overlap = overlap;
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MidSource;

    fn mids(values: &[f64]) -> Vec<GradeMid> {
        values
            .iter()
            .enumerate()
            .map(|(i, &mid)| GradeMid {
                grade: i as i64 + 1,
                mid,
                source: MidSource::Calculated,
            })
            .collect()
    }

    #[test]
    fn default_width_is_plus_minus_twenty_percent() {
        let table = derive_bands(&mids(&[1000.0]), &BandWidth::default()).unwrap();
        let b = &table.bands[0];
        assert!((b.min - 800.0).abs() < 1e-9);
        assert!((b.max - 1200.0).abs() < 1e-9);
        assert!((b.spread_pct - 50.0).abs() < 1e-12);
        assert!(((b.max - b.min) / b.min * 100.0 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn half_width_converts_to_spread() {
        let width = BandWidth::from_half_width(0.2).unwrap();
        assert!((width.spread_pct - 50.0).abs() < 1e-9);
        let width = BandWidth::from_half_width(0.1).unwrap();
        let (min, max) = band_limits(1000.0, width.spread_pct);
        assert!((min - 900.0).abs() < 1e-9);
        assert!((max - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn relations_are_null_at_the_edges() {
        let table = derive_bands(&mids(&[100.0, 110.0, 121.0]), &BandWidth::default()).unwrap();
        assert_eq!(table.bands[0].mid_point_differential, None);
        assert!(table.bands[0].range_overlap.is_some());
        assert!(table.bands[2].mid_point_differential.is_some());
        assert_eq!(table.bands[2].range_overlap, None);

        let d = table.bands[1].mid_point_differential.unwrap();
        assert!((d - 10.0).abs() < 1e-9);

        // (120 - 88) / (120 - 80) = 80%
        let o = table.bands[0].range_overlap.unwrap();
        assert!((o - 80.0).abs() < 1e-9, "overlap={o}");
    }

    #[test]
    fn negative_overlap_is_kept() {
        let table = derive_bands(&mids(&[100.0, 200.0]), &BandWidth::default()).unwrap();
        // (120 - 160) / 40 = -100%
        let o = table.bands[0].range_overlap.unwrap();
        assert!((o + 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_width_band_has_no_overlap() {
        let table = derive_bands(&mids(&[100.0, 120.0]), &BandWidth::uniform(0.0)).unwrap();
        let b = &table.bands[0];
        assert_eq!(b.min, b.max);
        assert_eq!(b.range_overlap, None);
        assert!(table.bands[1].mid_point_differential.is_some());
    }

    #[test]
    fn per_grade_spread_overrides() {
        let width = BandWidth::default().with_overrides([(2, 80.0)].into_iter().collect());
        let table = derive_bands(&mids(&[100.0, 120.0]), &width).unwrap();
        assert_eq!(table.bands[0].spread_pct, 50.0);
        assert_eq!(table.bands[1].spread_pct, 80.0);
        let b = &table.bands[1];
        assert!(((b.max - b.min) / b.min * 100.0 - 80.0).abs() < 1e-9);
        assert!(((b.min + b.max) / 2.0 - b.mid).abs() < 1e-9);
    }

    #[test]
    fn derivation_is_idempotent() {
        let input = mids(&[100.0, 103.0, 150.0, 154.5]);
        let a = derive_bands(&input, &BandWidth::default()).unwrap();
        let b = derive_bands(&input, &BandWidth::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(rederive(&a).unwrap(), a);
    }

    #[test]
    fn rejects_negative_spread() {
        let err = derive_bands(&mids(&[100.0]), &BandWidth::uniform(-5.0)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
