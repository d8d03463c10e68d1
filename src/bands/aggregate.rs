//! Per-grade midpoint estimation.
//!
//! Each grade's observations are reduced to one representative midpoint.
//! Grades are independent, so estimation runs in parallel; results come back
//! in ascending grade order and cover every grade between the lowest and the
//! highest observed one. Grades with too few observations carry `mid = None`
//! and are left for the gap filler.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use crate::domain::{
    DENSITY_WINDOW, Grade, MIN_DENSITY_CANDIDATES, MidEstimate, MidEstimator, MidSource,
    Observation, grade_span,
};
use crate::error::AppError;
use crate::math::{mean, median, min_max};

/// Settings that affect how one grade's midpoint is estimated.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    pub estimator: MidEstimator,
    /// Grades with fewer observations get no estimate.
    pub min_observations: usize,
    /// Number of evenly spaced candidates for the density search.
    pub density_candidates: usize,
}

/// Group observations by grade. Non-finite or non-positive pay is skipped.
pub fn group_by_grade(observations: &[Observation]) -> BTreeMap<Grade, Vec<f64>> {
    let mut groups: BTreeMap<Grade, Vec<f64>> = BTreeMap::new();
    for obs in observations {
        if obs.pay.is_finite() && obs.pay > 0.0 {
            groups.entry(obs.grade).or_default().push(obs.pay);
        }
    }
    groups
}

/// Estimate a midpoint for every grade in the observed range.
pub fn aggregate_mids(
    groups: &BTreeMap<Grade, Vec<f64>>,
    opts: &AggregateOptions,
) -> Result<Vec<MidEstimate>, AppError> {
    if opts.min_observations == 0 {
        return Err(AppError::input("Minimum observations per grade must be >= 1."));
    }
    if uses_density(opts.estimator) && opts.density_candidates < MIN_DENSITY_CANDIDATES {
        return Err(AppError::input(format!(
            "Density search needs at least {MIN_DENSITY_CANDIDATES} candidates (got {}).",
            opts.density_candidates
        )));
    }

    let (Some(&lo), Some(&hi)) = (groups.keys().next(), groups.keys().next_back()) else {
        return Err(AppError::insufficient_data("No observations to aggregate."));
    };

    grade_span(lo, hi)?;
    let grades: Vec<Grade> = (lo..=hi).collect();
    let estimates: Vec<MidEstimate> = grades
        .par_iter()
        .map(|&grade| {
            let pays = groups.get(&grade).map(Vec::as_slice).unwrap_or(&[]);
            let mid = if pays.len() >= opts.min_observations {
                estimate_mid(pays, opts.estimator, opts.density_candidates)
            } else {
                None
            };
            MidEstimate {
                grade,
                mid,
                source: if mid.is_some() {
                    MidSource::Calculated
                } else {
                    MidSource::Interpolated
                },
                n_obs: pays.len(),
            }
        })
        .collect();

    let calculated = estimates.iter().filter(|e| e.mid.is_some()).count();
    debug!(
        grades = estimates.len(),
        calculated,
        estimator = ?opts.estimator,
        "aggregated grade midpoints"
    );

    Ok(estimates)
}

/// Estimate one grade's midpoint from its pay observations.
pub fn estimate_mid(pays: &[f64], estimator: MidEstimator, candidates: usize) -> Option<f64> {
    match estimator {
        MidEstimator::Median => median(pays),
        MidEstimator::Mean => mean(pays),
        MidEstimator::Density => density_mid(pays, candidates),
        MidEstimator::Combined => {
            let a = median(pays)?;
            let b = density_mid(pays, candidates)?;
            Some(a.min(b))
        }
    }
}

/// Density-seeking midpoint.
///
/// Candidates are spaced evenly over `[min(pay), max(pay)]` (both ends
/// included). Each candidate `c` scores the number of observations inside
/// `[0.8c, 1.2c]`; the first (lowest) candidate reaching the best score wins.
///
/// The first candidate is `min(pay)` itself, so it always covers at least one
/// observation and some candidate is always chosen. The arithmetic mean is
/// only the initial value of the search and is never returned for positive pay.
pub fn density_mid(pays: &[f64], candidates: usize) -> Option<f64> {
    let (lo, hi) = min_max(pays)?;
    let fallback = mean(pays)?;
    let candidates = candidates.max(1);

    let step = if candidates > 1 {
        (hi - lo) / (candidates as f64 - 1.0)
    } else {
        0.0
    };

    let mut best = fallback;
    let mut best_count = 0usize;
    for i in 0..candidates {
        let c = if i + 1 == candidates { hi } else { lo + step * i as f64 };
        let lower = (1.0 - DENSITY_WINDOW) * c;
        let upper = (1.0 + DENSITY_WINDOW) * c;
        let count = pays.iter().filter(|&&p| p >= lower && p <= upper).count();
        if count > best_count {
            best_count = count;
            best = c;
        }
    }
    Some(best)
}

fn uses_density(estimator: MidEstimator) -> bool {
    matches!(estimator, MidEstimator::Density | MidEstimator::Combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MAX_GRADE_SPAN;

    fn obs(grade: Grade, pays: &[f64]) -> Vec<Observation> {
        pays.iter().map(|&pay| Observation { grade, pay }).collect()
    }

    fn opts(estimator: MidEstimator, min_observations: usize) -> AggregateOptions {
        AggregateOptions {
            estimator,
            min_observations,
            density_candidates: 1000,
        }
    }

    #[test]
    fn density_prefers_the_cluster() {
        // Four values near 100, one outlier at 300.
        let pays = [95.0, 100.0, 102.0, 110.0, 300.0];
        let mid = density_mid(&pays, 1000).unwrap();
        // The first candidate (95) already covers the four clustered values.
        assert_eq!(mid, 95.0);
    }

    #[test]
    fn density_ties_take_the_lowest_candidate() {
        let pays = [100.0, 100.0];
        assert_eq!(density_mid(&pays, 100), Some(100.0));

        // Both values fit in one window from the very first candidate.
        let pays = [100.0, 110.0];
        assert_eq!(density_mid(&pays, 100), Some(100.0));
    }

    #[test]
    fn combined_takes_the_lower_estimate() {
        let pays = [95.0, 100.0, 102.0, 110.0, 300.0];
        let combined = estimate_mid(&pays, MidEstimator::Combined, 100).unwrap();
        let med = median(&pays).unwrap();
        let dens = density_mid(&pays, 100).unwrap();
        assert_eq!(combined, med.min(dens));
    }

    #[test]
    fn sparse_grades_are_left_for_gap_filling() {
        let mut all = obs(1, &[100.0, 104.0]);
        all.extend(obs(2, &[120.0]));
        all.extend(obs(4, &[160.0, 170.0, 165.0]));

        let groups = group_by_grade(&all);
        let est = aggregate_mids(&groups, &opts(MidEstimator::Median, 2)).unwrap();

        let grades: Vec<Grade> = est.iter().map(|e| e.grade).collect();
        assert_eq!(grades, vec![1, 2, 3, 4]);
        assert_eq!(est[0].mid, Some(102.0));
        assert_eq!(est[0].source, MidSource::Calculated);
        assert_eq!(est[1].mid, None);
        assert_eq!(est[1].n_obs, 1);
        assert_eq!(est[2].mid, None);
        assert_eq!(est[2].n_obs, 0);
        assert_eq!(est[2].source, MidSource::Interpolated);
        assert_eq!(est[3].mid, Some(165.0));
    }

    #[test]
    fn rejects_too_few_density_candidates() {
        let groups = group_by_grade(&obs(1, &[100.0, 110.0]));
        let opts = AggregateOptions {
            estimator: MidEstimator::Density,
            min_observations: 2,
            density_candidates: 10,
        };
        assert_eq!(aggregate_mids(&groups, &opts).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn density_always_picks_a_candidate() {
        // Every candidate window misses the others, the lowest still covers itself.
        let pays = [10.0, 100.0, 1000.0];
        assert_eq!(density_mid(&pays, 100), Some(10.0));
    }

    #[test]
    fn rejects_an_unbounded_grade_span() {
        let mut all = obs(1, &[100.0]);
        all.extend(obs(2_000_000_000, &[200.0]));
        let err = aggregate_mids(&group_by_grade(&all), &opts(MidEstimator::Median, 1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let mut all = obs(i64::MIN, &[100.0]);
        all.extend(obs(i64::MAX, &[200.0]));
        let err = aggregate_mids(&group_by_grade(&all), &opts(MidEstimator::Median, 1)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("span"), "{}", err.message());
    }

    #[test]
    fn widest_allowed_span_is_accepted() {
        let mut all = obs(1, &[100.0]);
        all.extend(obs(MAX_GRADE_SPAN as Grade, &[200.0]));
        let est = aggregate_mids(&group_by_grade(&all), &opts(MidEstimator::Median, 1)).unwrap();
        assert_eq!(est.len(), MAX_GRADE_SPAN);
    }

    #[test]
    fn empty_input_is_insufficient_data() {
        let groups = BTreeMap::new();
        let err = aggregate_mids(&groups, &opts(MidEstimator::Mean, 1)).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
