//! Gap filling across the grade axis.
//!
//! Grades are treated as equally spaced ordinals. Only values that were known
//! before filling act as anchors, so the result does not depend on the order
//! in which gaps are visited.
//!
//! Geometric filling (the default):
//!
//! ```text
//! interior:  mid(g) = mid(a) * (mid(b) / mid(a)) ^ ((g - a) / (b - a))
//! edge:      same log-linear trend through the two nearest known grades
//! ```
//!
//! With a single known grade on the only available side, its value is reused.

use tracing::{debug, warn};

use crate::domain::{GapFillMethod, Grade, GradeMid, MidEstimate, MidSource, grade_span};
use crate::error::AppError;

/// Complete a partial grade -> midpoint mapping over its contiguous range.
///
/// The output has exactly one entry per grade between the lowest and highest
/// grade of `estimates`, in ascending order.
pub fn fill_gaps(estimates: &[MidEstimate], method: GapFillMethod) -> Result<Vec<GradeMid>, AppError> {
    let mut known: Vec<(Grade, f64)> = Vec::new();
    for e in estimates {
        match e.mid {
            Some(mid) if mid.is_finite() && mid > 0.0 => known.push((e.grade, mid)),
            Some(mid) => warn!(grade = e.grade, mid, "ignoring non-positive midpoint estimate"),
            None => {}
        }
    }
    known.sort_by_key(|&(g, _)| g);
    known.dedup_by_key(|&mut (g, _)| g);

    if known.is_empty() {
        return Err(AppError::insufficient_data(
            "No grade has enough observations to estimate a midpoint.",
        ));
    }

    let lo = estimates.iter().map(|e| e.grade).min().unwrap_or(known[0].0);
    let hi = estimates.iter().map(|e| e.grade).max().unwrap_or(known[known.len() - 1].0);

    let mut out = Vec::with_capacity(grade_span(lo, hi)?);
    let mut filled = 0usize;
    for grade in lo..=hi {
        let idx = known.partition_point(|&(g, _)| g < grade);
        if let Some(&(g, mid)) = known.get(idx) {
            if g == grade {
                let source = estimates
                    .iter()
                    .find(|e| e.grade == grade)
                    .map(|e| e.source)
                    .unwrap_or(MidSource::Calculated);
                out.push(GradeMid { grade, mid, source });
                continue;
            }
        }

        let below = &known[..idx];
        let above = &known[idx..];
        let mid = match method {
            GapFillMethod::Geometric => geometric_fill(grade, below, above),
            GapFillMethod::Linear => linear_fill(grade, below, above),
        };
        if !(mid.is_finite() && mid > 0.0) {
            return Err(AppError::numeric(format!(
                "Gap filling produced an invalid midpoint for grade {grade}: {mid}"
            )));
        }
        filled += 1;
        out.push(GradeMid {
            grade,
            mid,
            source: MidSource::Interpolated,
        });
    }

    debug!(grades = out.len(), filled, method = ?method, "filled grade gaps");
    Ok(out)
}

/// `below` holds known grades under `grade`, `above` those over it (both ascending).
fn geometric_fill(grade: Grade, below: &[(Grade, f64)], above: &[(Grade, f64)]) -> f64 {
    match (below.last(), above.first()) {
        (Some(&a), Some(&b)) => log_linear(a, b, grade),
        (None, Some(&nearest)) => match above.get(1) {
            Some(&next) => log_linear(nearest, next, grade),
            None => nearest.1,
        },
        (Some(&nearest), None) => match below.len().checked_sub(2).map(|i| below[i]) {
            Some(prev) => log_linear(prev, nearest, grade),
            None => nearest.1,
        },
        (None, None) => f64::NAN,
    }
}

fn linear_fill(grade: Grade, below: &[(Grade, f64)], above: &[(Grade, f64)]) -> f64 {
    match (below.last(), above.first()) {
        (Some(&(ga, pa)), Some(&(gb, pb))) => {
            let t = (grade - ga) as f64 / (gb - ga) as f64;
            pa + (pb - pa) * t
        }
        (None, Some(&(_, p))) | (Some(&(_, p)), None) => p,
        (None, None) => f64::NAN,
    }
}

/// Evaluate the log-linear line through `a` and `b` at `grade`.
fn log_linear((ga, pa): (Grade, f64), (gb, pb): (Grade, f64), grade: Grade) -> f64 {
    let rate = (pb / pa).ln() / (gb - ga) as f64;
    pa * (rate * (grade - ga) as f64).exp()
}
