//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - input configuration enums (`Strategy`, `MidEstimator`, `GapFillMethod`, `AgingMode`)
//! - validated observations (`Observation`, `Employee`)
//! - derivation outputs (`MidEstimate`, `GradeMid`, `GradeBand`, `BandTable`)
//! - the edit log entry (`EditRecord`)

pub mod types;

pub use types::*;
