//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the derivation and editing code stays clean and testable
//! - output changes are localized

use crate::app::pipeline::Derivation;
use crate::bands::EditLog;
use crate::domain::{BandTable, DeriveConfig, EditRecord, MidSource};
use crate::io::ingest::{IngestedData, RowError};
use crate::report::metrics::{Distribution, MetricsReport};

/// Format the run summary (dataset stats + stage counts + settings).
pub fn format_derivation_summary(ingest: &IngestedData, run: &Derivation, config: &DeriveConfig) -> String {
    let mut out = String::new();

    out.push_str("=== payband - Pay Range Derivation ===\n");
    out.push_str(&format!(
        "Strategy: {} (column `{}`)\n",
        config.strategy.display_name(),
        ingest.pay_column.header()
    ));
    out.push_str(&format!(
        "Rows: read={} used={} dropped={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len()
    ));
    out.push_str(&format!(
        "Grades observed: n={} | range=[{}, {}] | pay=[{}, {}]\n",
        ingest.stats.n_grades,
        ingest.stats.grade_min,
        ingest.stats.grade_max,
        fmt_money(ingest.stats.pay_min),
        fmt_money(ingest.stats.pay_max),
    ));
    out.push_str(&format!(
        "Settings: estimator={:?} min_obs={} gap_fill={:?} step={}% spread={}%\n",
        config.estimator,
        config.min_observations,
        config.gap_fill,
        config.step_pct,
        config.width.spread_pct,
    ));
    out.push_str(&format!(
        "Midpoints: calculated={} interpolated={} adjusted={}\n",
        run.count_source(MidSource::Calculated),
        run.count_source(MidSource::Interpolated),
        run.count_source(MidSource::Adjusted),
    ));

    if !ingest.row_errors.is_empty() {
        out.push('\n');
        out.push_str(&format_row_errors(&ingest.row_errors, 10));
    }

    out
}

/// List dropped input rows (at most `limit`).
pub fn format_row_errors(errors: &[RowError], limit: usize) -> String {
    let mut out = String::from("Dropped rows:\n");
    for e in errors.iter().take(limit) {
        let id = e.id.as_deref().map(|id| format!(" [{id}]")).unwrap_or_default();
        out.push_str(&format!("  line {}{id}: {}\n", e.line, e.message));
    }
    if errors.len() > limit {
        out.push_str(&format!("  ... and {} more\n", errors.len() - limit));
    }
    out
}

/// Band table, highest grade first.
pub fn format_band_table(table: &BandTable) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>6} {:>12} {:>12} {:>12} {:>8} {:>8} {:>8} {:<12}",
            "grade", "min", "mid", "max", "spread", "diff", "overlap", "mid_calc"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<6} {:-<12} {:-<12} {:-<12} {:-<8} {:-<8} {:-<8} {:-<12}",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for b in table.iter().rev() {
        out.push_str(
            format!(
                "{:>6} {:>12} {:>12} {:>12} {:>8} {:>8} {:>8} {:<12}",
                b.grade,
                fmt_money(b.min),
                fmt_money(b.mid),
                fmt_money(b.max),
                fmt_pct(Some(b.spread_pct)),
                fmt_pct(b.mid_point_differential),
                fmt_pct(b.range_overlap),
                b.mid_source.label(),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

pub fn format_edit_record(r: &EditRecord) -> String {
    format!(
        "grade {}: {} {} -> {}",
        r.grade,
        r.param.label(),
        fmt_value(r.old_value),
        fmt_value(r.new_value)
    )
}

/// Edit history, newest first.
pub fn format_edit_log(log: &EditLog) -> String {
    if log.is_empty() {
        return "Edit log: empty\n".to_string();
    }
    let mut out = format!("Edit log ({} entries, newest first):\n", log.len());
    let entries: Vec<&EditRecord> = log.iter().collect();
    for r in entries.into_iter().rev() {
        out.push_str(&format!(
            "  {}  {}\n",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            format_edit_record(r)
        ));
    }
    out
}

/// Dashboard-style metrics block.
pub fn format_metrics(report: &MetricsReport) -> String {
    let s = &report.summary;
    let t = &report.table;
    let mut out = String::new();

    out.push_str("=== Pay Alignment ===\n");
    out.push_str(&format!(
        "Employees: {} | grades: {} | jobs: {}",
        s.employee_count, s.grade_count, s.job_count
    ));
    if report.unmatched > 0 {
        out.push_str(&format!(" | unmatched: {}", report.unmatched));
    }
    out.push('\n');
    out.push_str(&format!(
        "Base pay: mean {} | median {} | payroll {}\n",
        fmt_money(s.mean_pay),
        fmt_money(s.median_pay),
        fmt_money(s.payroll)
    ));
    out.push_str(&format!(
        "Percentiles: P10 {} | P25 {} | P75 {} | P90 {} | P90/P10 {}\n",
        fmt_money(s.p10),
        fmt_money(s.p25),
        fmt_money(s.p75),
        fmt_money(s.p90),
        s.p90_p10.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string()),
    ));
    out.push_str(&format!("Compa-ratio: {}\n", fmt_distribution(&s.compa_ratio)));
    out.push_str(&format!(
        "Range penetration: {}\n",
        s.range_penetration
            .as_ref()
            .map(fmt_distribution)
            .unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!(
        "Below range: {} ({:.1}%) | within: {} ({:.1}%) | above: {} ({:.1}%)\n",
        s.below_count, s.below_pct, s.within_count, s.within_pct, s.above_count, s.above_pct
    ));
    out.push_str(&format!(
        "Shortfall to min: {} ({:.2}% of payroll) | excess over max: {}\n",
        fmt_money(s.shortfall_to_min),
        s.shortfall_share_pct,
        fmt_money(s.excess_over_max)
    ));
    if let (Some(most), Some(fewest)) = (s.most_below_grade, s.fewest_below_grade) {
        out.push_str(&format!(
            "Most below range: grade {} ({}) | fewest: grade {} ({})\n",
            most.grade, most.count, fewest.grade, fewest.count
        ));
    }

    out.push_str("\n=== Range Structure ===\n");
    out.push_str(&format!(
        "Grades: {} | avg spread {} | avg differential {} | avg overlap {}\n",
        t.grade_count,
        fmt_pct(t.mean_spread_pct),
        fmt_pct(t.mean_mid_point_differential),
        fmt_pct(t.mean_range_overlap)
    ));

    if let Some(g) = &report.gender {
        out.push_str("\n=== Gender ===\n");
        let headcount: Vec<String> = g.headcount.iter().map(|(k, v)| format!("{k} {v}")).collect();
        out.push_str(&format!("Headcount: {}\n", headcount.join(" | ")));
        out.push_str(&format!(
            "Mean pay: male {} | female {} | gap {} ({})\n",
            fmt_opt_money(g.male_mean),
            fmt_opt_money(g.female_mean),
            fmt_pct(g.mean_gap_pct),
            fmt_opt_money(g.mean_gap_abs)
        ));
        out.push_str(&format!(
            "Median pay: male {} | female {} | gap {} ({})\n",
            fmt_opt_money(g.male_median),
            fmt_opt_money(g.female_median),
            fmt_pct(g.median_gap_pct),
            fmt_opt_money(g.median_gap_abs)
        ));
        for (i, q) in g.quartiles.iter().enumerate() {
            let counts: Vec<String> = q.iter().map(|(k, v)| format!("{k} {v}")).collect();
            out.push_str(&format!("  Q{}: {}\n", i + 1, counts.join(" | ")));
        }
    }

    out
}

fn fmt_distribution(d: &Distribution) -> String {
    format!(
        "mean {:.3} | median {:.3} | min {:.3} | max {:.3}",
        d.mean, d.median, d.min, d.max
    )
}

/// Whole currency units with thousands separators.
pub fn fmt_money(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn fmt_opt_money(v: Option<f64>) -> String {
    v.map(fmt_money).unwrap_or_else(|| "-".to_string())
}

pub fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.1}%"),
        None => "-".to_string(),
    }
}

fn fmt_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}
