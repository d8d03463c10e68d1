//! Reporting: pay-alignment metrics and terminal formatting.

pub mod format;
pub mod metrics;

pub use format::*;
pub use metrics::*;
