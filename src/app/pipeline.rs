//! Shared derivation pipeline.
//!
//! Every entry point that produces a first-cut table goes through here:
//! ingest -> aggregate -> gap fill -> repair -> derive
//!
//! The intermediate stages are kept on the output so they can be reported and
//! written to the audit bundle.

use tracing::info;

use crate::bands::{AggregateOptions, aggregate_mids, derive_bands, fill_gaps, group_by_grade, repair_monotonic};
use crate::domain::{BandTable, DeriveConfig, GradeMid, MidEstimate, MidSource, Observation};
use crate::error::AppError;
use crate::io::ingest::{IngestedData, load_employees};

/// Every stage of one derivation, in pipeline order.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub estimates: Vec<MidEstimate>,
    pub filled: Vec<GradeMid>,
    pub repaired: Vec<GradeMid>,
    pub table: BandTable,
}

impl Derivation {
    pub fn count_source(&self, source: MidSource) -> usize {
        self.table.iter().filter(|b| b.mid_source == source).count()
    }
}

/// All computed outputs of a single `payband derive` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub derivation: Derivation,
}

/// Derive a band table from observations already in memory.
pub fn derive_table(observations: &[Observation], config: &DeriveConfig) -> Result<Derivation, AppError> {
    let groups = group_by_grade(observations);
    let opts = AggregateOptions {
        estimator: config.estimator,
        min_observations: config.min_observations,
        density_candidates: config.density_candidates,
    };

    let estimates = aggregate_mids(&groups, &opts)?;
    let filled = fill_gaps(&estimates, config.gap_fill)?;
    let repaired = repair_monotonic(&filled, config.step_pct)?;
    let table = derive_bands(&repaired, &config.width)?;

    let derivation = Derivation {
        estimates,
        filled,
        repaired,
        table,
    };
    info!(
        grades = derivation.table.len(),
        interpolated = derivation.count_source(MidSource::Interpolated),
        adjusted = derivation.count_source(MidSource::Adjusted),
        "derived pay ranges"
    );
    Ok(derivation)
}

/// Ingest the configured input file and derive its band table.
pub fn run_derivation(config: &DeriveConfig) -> Result<RunOutput, AppError> {
    let ingest = load_employees(&config.input_path, config.strategy.pay_column(), config.min_records)?;
    let derivation = derive_table(&ingest.observations(), config)?;
    Ok(RunOutput { ingest, derivation })
}
