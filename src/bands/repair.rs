//! Monotonicity repair.
//!
//! Single bottom-up pass. When grade `i` does not pay more than grade `i-1`,
//! its midpoint becomes `mid[i-1] + inc`, where `inc` is the smallest strictly
//! positive candidate of:
//!
//! - `mid[i-1] * step_pct / 100` (always a candidate)
//! - `(mid[i+1] - mid[i-1]) / 2` when grade `i+1` exists
//!
//! `mid[i+1]` is read before it is itself repaired. Each repaired value is the
//! baseline for the next comparison; the pass is not iterated to a fixed point.

use tracing::debug;

use crate::domain::{GradeMid, MidSource};
use crate::error::AppError;

/// Enforce strictly increasing midpoints in ascending grade order.
pub fn repair_monotonic(mids: &[GradeMid], step_pct: f64) -> Result<Vec<GradeMid>, AppError> {
    if !(step_pct.is_finite() && step_pct > 0.0) {
        return Err(AppError::input(format!(
            "Invalid minimum grade step {step_pct}% (must be finite and > 0)."
        )));
    }

    let mut out = mids.to_vec();
    out.sort_by_key(|m| m.grade);

    let step = step_pct / 100.0;
    let mut adjusted = 0usize;
    for i in 1..out.len() {
        let below = out[i - 1].mid;
        if out[i].mid > below {
            continue;
        }

        let floor = below * step;
        let mut inc = floor;
        if let Some(next) = out.get(i + 1) {
            let half_gap = (next.mid - below) / 2.0;
            if half_gap > 0.0 && half_gap < inc {
                inc = half_gap;
            }
        }

        debug!(
            grade = out[i].grade,
            from = out[i].mid,
            to = below + inc,
            "repaired grade inversion"
        );
        out[i].mid = below + inc;
        out[i].source = MidSource::Adjusted;
        adjusted += 1;
    }

    if adjusted > 0 {
        debug!(adjusted, "monotonicity repair finished");
    }
    Ok(out)
}
