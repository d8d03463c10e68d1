//! Command-line parsing for `payband`.
//!
//! The goal of this module is to keep **argument parsing** separate from
//! command dispatch (`app`) and from the derivation code (`bands`).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{
    AgingMode, BandParam, DEFAULT_SPREAD_PCT, DEFAULT_STEP_PCT, GapFillMethod, Grade, MidEstimator, Strategy,
};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "payband", version, about = "Pay-range derivation from market or employee pay")]
pub struct Cli {
    /// Log progress to stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Derive a first-cut pay-range table from a pay file and store it in the workspace.
    Derive(DeriveArgs),
    /// Print a stored table and, optionally, the edit log.
    Show(ShowArgs),
    /// Override one grade's midpoint or spread.
    Edit(EditArgs),
    /// Revert the most recent edit.
    Undo(StateArgs),
    /// Discard all edits and rebuild the working table from the first cut.
    Reset(StateArgs),
    /// Apply pay inflation and store the final table.
    Age(AgeArgs),
    /// Compare employee pay against a stored table.
    Metrics(MetricsArgs),
    /// Write a stored table in the seven-column export layout.
    Export(ExportArgs),
    /// Generate a synthetic workforce file.
    Sample(SampleArgs),
}

/// Workspace location, shared by every stateful subcommand.
#[derive(Debug, Args, Clone)]
pub struct StateArgs {
    /// Workspace directory.
    #[arg(long = "state", env = "PAYBAND_STATE", default_value = "payband_state")]
    pub state: PathBuf,
}

/// Which stored table a read-only command should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TableChoice {
    FirstCut,
    Working,
    Final,
}

#[derive(Debug, Args, Clone)]
pub struct DeriveArgs {
    /// Input CSV (`Grade` plus `Base Pay` or `Target Pay`).
    pub input: PathBuf,

    /// Which pay source the midpoints come from.
    #[arg(short = 's', long, value_enum, default_value_t = Strategy::Employee)]
    pub strategy: Strategy,

    /// Midpoint estimator (default depends on the strategy).
    #[arg(long, value_enum)]
    pub estimator: Option<MidEstimator>,

    /// Minimum observations for a grade to get its own estimate (default depends on the strategy).
    #[arg(long)]
    pub min_obs: Option<usize>,

    /// Candidate count for the density search (>= 100).
    #[arg(long)]
    pub candidates: Option<usize>,

    /// How grades without an estimate are filled.
    #[arg(long, value_enum, default_value_t = GapFillMethod::Geometric)]
    pub gap_fill: GapFillMethod,

    /// Minimum step between adjacent repaired grades, in percent.
    #[arg(long, default_value_t = DEFAULT_STEP_PCT)]
    pub step: f64,

    /// Range spread `(max - min) / min`, in percent.
    #[arg(long, env = "PAYBAND_SPREAD", default_value_t = DEFAULT_SPREAD_PCT)]
    pub spread: f64,

    /// Symmetric half-width around the midpoint (e.g. 0.2 for ±20%); overrides `--spread`.
    #[arg(long)]
    pub half_width: Option<f64>,

    /// Per-grade spread override, `GRADE=PCT` (repeatable).
    #[arg(long = "grade-spread", value_parser = parse_grade_spread)]
    pub grade_spread: Vec<(Grade, f64)>,

    /// Fewer valid input rows than this is an error.
    #[arg(long, env = "PAYBAND_MIN_RECORDS", default_value_t = 10)]
    pub min_records: usize,

    #[command(flatten)]
    pub state: StateArgs,

    /// Print the table without touching the workspace.
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the table to this CSV (export layout).
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Write a markdown audit bundle of every stage into this directory.
    #[arg(long)]
    pub audit_dir: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Table to print (default: working table).
    #[arg(long, value_enum, default_value_t = TableChoice::Working)]
    pub table: TableChoice,

    /// Also print the edit log.
    #[arg(long)]
    pub log: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EditArgs {
    #[command(flatten)]
    pub state: StateArgs,

    pub grade: Grade,

    #[arg(value_enum)]
    pub param: BandParam,

    /// New value (currency for `mid`, percent for `spread`).
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[derive(Debug, Args, Clone)]
pub struct AgeArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Annual pay inflation, in percent.
    #[arg(long, default_value_t = 4.0, allow_hyphen_values = true)]
    pub rate: f64,

    /// Months to age forward.
    #[arg(long, default_value_t = 6.0)]
    pub months: f64,

    #[arg(long, value_enum, default_value_t = AgingMode::Simple)]
    pub mode: AgingMode,

    /// Age the first cut instead of the working table.
    #[arg(long)]
    pub from_first_cut: bool,

    /// Also write the aged table to this CSV (export layout).
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct MetricsArgs {
    /// Employee CSV (`Grade`, `Base Pay`, optional `Gender`, `Job`, `Employee ID`).
    pub employees: PathBuf,

    #[command(flatten)]
    pub state: StateArgs,

    /// Table to compare against (default: final if aged, else working).
    #[arg(long, value_enum)]
    pub table: Option<TableChoice>,

    #[arg(long, env = "PAYBAND_MIN_RECORDS", default_value_t = 10)]
    pub min_records: usize,

    /// Print the metrics as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Write per-employee compa-ratio and penetration to this CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Output CSV.
    pub output: PathBuf,

    /// Table to export (default: final if aged, else working).
    #[arg(long, value_enum)]
    pub table: Option<TableChoice>,
}

#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Output CSV.
    pub output: PathBuf,

    #[arg(short = 'n', long, default_value_t = 500)]
    pub count: usize,

    /// Number of grades (`1..=N`).
    #[arg(long, default_value_t = 12)]
    pub grades: Grade,

    /// Grades left without employees (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub empty_grades: Vec<Grade>,

    #[arg(long, default_value_t = 32_000.0)]
    pub base_pay: f64,

    /// Expected pay increase per grade, in percent.
    #[arg(long, default_value_t = 12.0)]
    pub grade_step: f64,

    /// Standard deviation of log pay within a grade.
    #[arg(long, default_value_t = 0.12)]
    pub noise: f64,

    #[arg(long, default_value_t = 0.5)]
    pub female_share: f64,

    /// Female pay discount, in percent.
    #[arg(long, default_value_t = 4.0, allow_hyphen_values = true)]
    pub gender_gap: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Parse `GRADE=PCT`.
fn parse_grade_spread(s: &str) -> Result<(Grade, f64), String> {
    let (grade, pct) = s
        .split_once('=')
        .ok_or_else(|| format!("expected GRADE=PCT, got '{s}'"))?;
    let grade = grade
        .trim()
        .parse::<Grade>()
        .map_err(|e| format!("invalid grade '{grade}': {e}"))?;
    let pct = pct
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid spread '{pct}': {e}"))?;
    Ok((grade, pct))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grade_spread() {
        assert_eq!(parse_grade_spread("4=60"), Ok((4, 60.0)));
        assert!(parse_grade_spread("4").is_err());
        assert!(parse_grade_spread("x=60").is_err());
    }

    #[test]
    fn edit_accepts_negative_looking_values() {
        let cli = Cli::try_parse_from(["payband", "edit", "3", "spread", "-5"]).unwrap();
        match cli.command {
            Command::Edit(args) => {
                assert_eq!(args.grade, 3);
                assert_eq!(args.param, BandParam::SpreadPct);
                assert_eq!(args.value, "-5");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn derive_defaults() {
        let cli = Cli::try_parse_from(["payband", "derive", "pay.csv", "-s", "market"]).unwrap();
        let Command::Derive(args) = cli.command else {
            panic!("expected derive");
        };
        assert_eq!(args.strategy, Strategy::Market);
        assert_eq!(args.gap_fill, GapFillMethod::Geometric);
        assert!(args.estimator.is_none());
        assert!(!args.dry_run);
    }
}
