//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs logging
//! - runs the derivation pipeline or a workspace operation
//! - prints reports and writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bands::age_table;
use crate::cli::{
    AgeArgs, Command, DeriveArgs, EditArgs, ExportArgs, MetricsArgs, SampleArgs, ShowArgs, StateArgs, TableChoice,
};
use crate::data::{SampleConfig, generate_workforce, write_workforce_csv};
use crate::domain::{AgingConfig, BandTable, BandWidth, DeriveConfig, PayColumn};
use crate::error::AppError;
use crate::io::export::{write_bands_csv, write_employee_metrics_csv};
use crate::io::ingest::load_employees;
use crate::io::state::{FINAL_FILE, Workspace};
use crate::report::{compute_metrics, format_band_table, format_derivation_summary, format_edit_log, format_edit_record, format_metrics};

pub mod pipeline;

/// Entry point for the `payband` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Derive(args) => handle_derive(args),
        Command::Show(args) => handle_show(args),
        Command::Edit(args) => handle_edit(args),
        Command::Undo(args) => handle_undo(args),
        Command::Reset(args) => handle_reset(args),
        Command::Age(args) => handle_age(args),
        Command::Metrics(args) => handle_metrics(args),
        Command::Export(args) => handle_export(args),
        Command::Sample(args) => handle_sample(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_derive(args: DeriveArgs) -> Result<(), AppError> {
    let config = derive_config_from_args(&args)?;
    let run = pipeline::run_derivation(&config)?;

    println!("{}", format_derivation_summary(&run.ingest, &run.derivation, &config));
    println!("{}", format_band_table(&run.derivation.table));

    if let Some(dir) = &config.state_dir {
        let ws = Workspace::open(dir)?;
        ws.save_first_cut(&run.derivation.table)?;
        println!("Saved first cut to {}", ws.dir().display());
    }
    if let Some(path) = &config.export {
        write_bands_csv(path, &run.derivation.table)?;
        println!("Exported table to {}", path.display());
    }
    if let Some(dir) = &config.audit_dir {
        let path = crate::audit::write_audit_bundle(dir, &run.ingest, &run.derivation, &config)?;
        println!("Wrote audit bundle to {}", path.display());
    }

    Ok(())
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let ws = Workspace::open(&args.state.state)?;
    let table = load_table(&ws, Some(args.table))?;
    println!("{}", format_band_table(&table));
    if args.log {
        println!("{}", format_edit_log(&ws.load_log()?));
    }
    Ok(())
}

fn handle_edit(args: EditArgs) -> Result<(), AppError> {
    let value = parse_edit_value(&args.value)?;
    let ws = Workspace::open(&args.state.state)?;
    let mut editor = ws.load_editor()?;

    let record = editor.apply(args.grade, args.param, value)?;
    ws.save_editor(&editor)?;

    println!("Edited {}", format_edit_record(&record));
    println!("{}", format_band_table(editor.table()));
    Ok(())
}

fn handle_undo(args: StateArgs) -> Result<(), AppError> {
    let ws = Workspace::open(&args.state)?;
    let mut editor = ws.load_editor()?;

    let record = editor.undo_last()?;
    ws.save_editor(&editor)?;

    println!("Reverted {}", format_edit_record(&record));
    println!("{}", format_band_table(editor.table()));
    Ok(())
}

fn handle_reset(args: StateArgs) -> Result<(), AppError> {
    let ws = Workspace::open(&args.state)?;
    let mut editor = ws.load_editor()?;

    let discarded = editor.log().len();
    editor.reset_all()?;
    ws.save_editor(&editor)?;

    println!("Discarded {discarded} edit(s); working table rebuilt from the first cut.");
    println!("{}", format_band_table(editor.table()));
    Ok(())
}

fn handle_age(args: AgeArgs) -> Result<(), AppError> {
    let ws = Workspace::open(&args.state.state)?;
    let source = if args.from_first_cut {
        ws.load_first_cut()?
    } else {
        ws.load_working()?
    };

    let aging = AgingConfig {
        annual_rate_pct: args.rate,
        months: args.months,
        mode: args.mode,
    };
    let aged = age_table(&source, &aging)?;
    let path = ws.write_final(&aged)?;

    println!("{}", format_band_table(&aged));
    println!("Saved aged table to {}", path.display());
    if let Some(export) = &args.export {
        write_bands_csv(export, &aged)?;
        println!("Exported table to {}", export.display());
    }
    Ok(())
}

fn handle_metrics(args: MetricsArgs) -> Result<(), AppError> {
    let ws = Workspace::open(&args.state.state)?;
    let table = load_table(&ws, args.table)?;
    let ingest = load_employees(&args.employees, PayColumn::BasePay, args.min_records)?;

    let report = compute_metrics(&ingest.employees, &table)?;
    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| AppError::numeric(format!("Failed to serialize metrics: {e}")))?;
        println!("{json}");
    } else {
        println!("{}", format_metrics(&report));
    }

    if let Some(path) = &args.export {
        write_employee_metrics_csv(path, &report.employees)?;
        info!(path = %path.display(), rows = report.employees.len(), "exported employee metrics");
    }
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<(), AppError> {
    let ws = Workspace::open(&args.state.state)?;
    let table = load_table(&ws, args.table)?;
    write_bands_csv(&args.output, &table)?;
    println!("Exported {} grades to {}", table.len(), args.output.display());
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let config = SampleConfig {
        count: args.count,
        grades: args.grades,
        base_pay: args.base_pay,
        grade_step_pct: args.grade_step,
        noise_sigma: args.noise,
        female_share: args.female_share,
        gender_gap_pct: args.gender_gap,
        empty_grades: args.empty_grades,
        seed: args.seed,
    };
    let workforce = generate_workforce(&config)?;
    write_workforce_csv(&args.output, &workforce)?;
    println!("Wrote {} employees to {}", workforce.len(), args.output.display());
    Ok(())
}

/// Pick a stored table. Without an explicit choice the aged table wins, then the working one.
fn load_table(ws: &Workspace, choice: Option<TableChoice>) -> Result<BandTable, AppError> {
    match choice {
        Some(TableChoice::FirstCut) => ws.load_first_cut(),
        Some(TableChoice::Working) => ws.load_working(),
        Some(TableChoice::Final) => ws.load_final(),
        None if ws.path(FINAL_FILE).is_file() => ws.load_final(),
        None => ws.load_working(),
    }
}

/// Edit values arrive as text; anything that is not a number is rejected.
pub fn parse_edit_value(raw: &str) -> Result<f64, AppError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AppError::rejected_edit(format!("Value '{raw}' is not a number.")))
}

pub fn derive_config_from_args(args: &DeriveArgs) -> Result<DeriveConfig, AppError> {
    let mut config = DeriveConfig::for_strategy(args.strategy, args.input.clone());
    if let Some(estimator) = args.estimator {
        config.estimator = estimator;
    }
    if let Some(min_obs) = args.min_obs {
        config.min_observations = min_obs;
    }
    if let Some(candidates) = args.candidates {
        config.density_candidates = candidates;
    }
    config.gap_fill = args.gap_fill;
    config.step_pct = args.step;

    let width = match args.half_width {
        Some(h) => BandWidth::from_half_width(h)?,
        None => BandWidth::uniform(args.spread),
    };
    config.width = width.with_overrides(args.grade_spread.iter().copied().collect());
    config.width.validate()?;

    config.min_records = args.min_records;
    config.state_dir = (!args.dry_run).then(|| args.state.state.clone());
    config.export = args.export.clone();
    config.audit_dir = args.audit_dir.clone();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MidEstimator, Strategy};

    fn derive_args(argv: &[&str]) -> DeriveArgs {
        let mut full = vec!["payband", "derive"];
        full.extend_from_slice(argv);
        match crate::cli::Cli::try_parse_from(full).unwrap().command {
            Command::Derive(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn strategy_defaults_flow_into_config() {
        let config = derive_config_from_args(&derive_args(&["pay.csv", "-s", "combined"])).unwrap();
        assert_eq!(config.strategy, Strategy::Combined);
        assert_eq!(config.estimator, MidEstimator::Combined);
        assert_eq!(config.density_candidates, 100);
        assert_eq!(config.min_observations, 2);
    }

    #[test]
    fn overrides_win_over_strategy_defaults() {
        let args = derive_args(&[
            "pay.csv",
            "--estimator",
            "mean",
            "--min-obs",
            "3",
            "--half-width",
            "0.1",
            "--grade-spread",
            "5=80",
            "--dry-run",
        ]);
        let config = derive_config_from_args(&args).unwrap();
        assert_eq!(config.estimator, MidEstimator::Mean);
        assert_eq!(config.min_observations, 3);
        assert!((config.width.spread_pct - 2.0 / 0.9 * 10.0).abs() < 1e-9);
        assert_eq!(config.width.spread_for(5), 80.0);
        assert!(config.state_dir.is_none());
    }

    #[test]
    fn negative_grade_spread_is_rejected() {
        let args = derive_args(&["pay.csv", "--grade-spread", "2=-10"]);
        assert_eq!(derive_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn non_numeric_edit_value_is_rejected() {
        assert_eq!(parse_edit_value(" 52000.5 ").unwrap(), 52000.5);
        assert_eq!(parse_edit_value("abc").unwrap_err().exit_code(), 5);
    }
}
