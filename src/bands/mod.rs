//! Pay-band derivation.
//!
//! Stages, in pipeline order:
//!
//! - `aggregate`: observations -> one midpoint estimate per grade
//! - `gap_fill`: fill grades without an estimate
//! - `repair`: enforce strictly increasing midpoints
//! - `derive`: midpoints -> bands + relational metrics
//!
//! plus `mutate` (manual overrides with undo) and `aging` (scalar inflation).

pub mod aggregate;
pub mod aging;
pub mod derive;
pub mod gap_fill;
pub mod mutate;
pub mod repair;

pub use aggregate::*;
pub use aging::*;
pub use derive::*;
pub use gap_fill::*;
pub use mutate::*;
pub use repair::*;
