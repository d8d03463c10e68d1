//! Aging: move a table forward in time by a uniform pay-inflation factor.
//!
//! Only `min`, `mid` and `max` are scaled. Spread, differential and overlap are
//! ratios and stay unchanged (up to floating-point rounding).

use tracing::info;

use crate::domain::{AgingConfig, AgingMode, BandTable};
use crate::error::AppError;

pub fn aging_factor(config: &AgingConfig) -> Result<f64, AppError> {
    let AgingConfig {
        annual_rate_pct,
        months,
        mode,
    } = *config;
    if !annual_rate_pct.is_finite() || annual_rate_pct <= -100.0 {
        return Err(AppError::input(format!(
            "Invalid annual aging rate {annual_rate_pct}% (must be finite and > -100)."
        )));
    }
    if !(months.is_finite() && months >= 0.0) {
        return Err(AppError::input(format!("Invalid aging period {months} months (must be >= 0).")));
    }

    let rate = annual_rate_pct / 100.0;
    let years = months / 12.0;
    let factor = match mode {
        AgingMode::Simple => 1.0 + rate * years,
        AgingMode::Compound => (1.0 + rate).powf(years),
    };
    if !(factor.is_finite() && factor > 0.0) {
        return Err(AppError::input(format!("Aging factor {factor} is not a positive number.")));
    }
    Ok(factor)
}

/// Return an aged copy of `table`.
pub fn age_table(table: &BandTable, config: &AgingConfig) -> Result<BandTable, AppError> {
    let factor = aging_factor(config)?;
    let mut aged = table.clone();
    for band in &mut aged.bands {
        band.min *= factor;
        band.mid *= factor;
        band.max *= factor;
    }
    info!(factor, months = config.months, rate = config.annual_rate_pct, "aged pay ranges");
    Ok(aged)
}
