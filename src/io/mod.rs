//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - band-table CSV codec (`table`)
//! - workspace persistence (`state`)
//! - exports for downstream consumers (`export`)

pub mod export;
pub mod ingest;
pub mod state;
pub mod table;

pub use export::*;
pub use ingest::*;
pub use state::*;
pub use table::*;
