//! Audit bundle writer: every derivation stage as one markdown file.
//!
//! The bundle answers "where did this midpoint come from": the raw per-grade
//! estimate, what gap filling put in, what the repair pass changed, and the
//! final table.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::app::pipeline::Derivation;
use crate::domain::DeriveConfig;
use crate::error::AppError;
use crate::io::ingest::IngestedData;

pub fn write_audit_bundle(
    dir: &Path,
    ingest: &IngestedData,
    run: &Derivation,
    config: &DeriveConfig,
) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::input(format!("Failed to create audit dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let strategy = format!("{:?}", config.strategy).to_lowercase();
    let path = dir.join(format!("payband_audit_{strategy}_{ts}.md"));

    let body = render_audit(ingest, run, config);
    let mut file = File::create(&path)
        .map_err(|e| AppError::input(format!("Failed to create audit file: {e}")))?;
    file.write_all(body.as_bytes())
        .map_err(|e| AppError::input(format!("Failed to write audit file: {e}")))?;

    Ok(path)
}

/// Markdown body of the audit bundle.
pub fn render_audit(ingest: &IngestedData, run: &Derivation, config: &DeriveConfig) -> String {
    let mut out = String::new();

    out.push_str("# payband audit bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    out.push_str(&format!("- input: {}\n", config.input_path.display()));
    out.push_str(&format!(
        "- strategy: {} (column `{}`)\n",
        config.strategy.display_name(),
        ingest.pay_column.header()
    ));
    out.push_str(&format!(
        "- estimator: {:?}, min_obs: {}, density_candidates: {}\n",
        config.estimator, config.min_observations, config.density_candidates
    ));
    out.push_str(&format!(
        "- gap_fill: {:?}, step: {}%, spread: {}%\n",
        config.gap_fill, config.step_pct, config.width.spread_pct
    ));
    for (grade, spread) in &config.width.overrides {
        out.push_str(&format!("- spread override: grade {grade} -> {spread}%\n"));
    }
    out.push_str(&format!(
        "- rows: read={} used={} dropped={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len()
    ));

    if !ingest.row_errors.is_empty() {
        out.push_str("\n## Dropped rows\n");
        out.push_str("| line | id | reason |\n| - | - | - |\n");
        for e in &ingest.row_errors {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                e.line,
                e.id.as_deref().unwrap_or("-"),
                e.message.replace('|', "\\|")
            ));
        }
    }

    out.push_str("\n## Grade estimates\n");
    out.push_str("| grade | n_obs | estimate |\n| - | - | - |\n");
    for e in &run.estimates {
        out.push_str(&format!("| {} | {} | {} |\n", e.grade, e.n_obs, fmt_opt(e.mid)));
    }

    out.push_str("\n## Gap fill and repair\n");
    out.push_str("| grade | filled | repaired | mid_calc |\n| - | - | - | - |\n");
    for (filled, repaired) in run.filled.iter().zip(&run.repaired) {
        out.push_str(&format!(
            "| {} | {:.6} | {:.6} | {} |\n",
            filled.grade,
            filled.mid,
            repaired.mid,
            repaired.source.label()
        ));
    }

    out.push_str("\n## Bands\n");
    out.push_str("| grade | min | mid | max | spread | diff | overlap |\n| - | - | - | - | - | - | - |\n");
    for b in run.table.iter().rev() {
        out.push_str(&format!(
            "| {} | {:.6} | {:.6} | {:.6} | {:.4} | {} | {} |\n",
            b.grade,
            b.min,
            b.mid,
            b.max,
            b.spread_pct,
            fmt_opt(b.mid_point_differential),
            fmt_opt(b.range_overlap)
        ));
    }

    out
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.6}"),
        _ => "-".to_string(),
    }
}
