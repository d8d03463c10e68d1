//! `pay-bands` library crate.
//!
//! The binary (`payband`) is a thin wrapper around this library so that:
//!
//! - the derivation core is testable without spawning processes
//! - modules are reusable from other front-ends
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod audit;
pub mod bands;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
