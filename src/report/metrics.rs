//! Pay-alignment metrics: how actual pay sits against a band table.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::{BandTable, Employee, Grade};
use crate::error::AppError;
use crate::math::{mean, median, min_max, quantile};

/// One employee joined to their grade's band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeMetrics {
    pub id: Option<String>,
    pub job: Option<String>,
    pub grade: Grade,
    pub gender: Option<String>,
    pub pay: f64,
    pub range_min: f64,
    pub range_mid: f64,
    pub range_max: f64,
    /// `pay / mid`.
    pub compa_ratio: f64,
    /// `(pay - min) / (max - min)`; `None` for a zero-width band.
    pub range_penetration: Option<f64>,
    pub below_min: bool,
    pub above_max: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distribution {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl Distribution {
    fn of(values: &[f64]) -> Option<Self> {
        let (min, max) = min_max(values)?;
        Some(Self {
            mean: mean(values)?,
            median: median(values)?,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GradeCount {
    pub grade: Grade,
    pub count: usize,
}

/// Workforce-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaySummary {
    pub employee_count: usize,
    pub grade_count: usize,
    pub job_count: usize,
    pub payroll: f64,
    pub mean_pay: f64,
    pub median_pay: f64,
    pub compa_ratio: Distribution,
    pub range_penetration: Option<Distribution>,
    pub below_count: usize,
    pub above_count: usize,
    pub within_count: usize,
    pub below_pct: f64,
    pub above_pct: f64,
    pub within_pct: f64,
    /// Sum of `min - pay` over employees paid below their range.
    pub shortfall_to_min: f64,
    /// Sum of `max - pay` over employees paid above their range (never positive).
    pub excess_over_max: f64,
    /// `shortfall_to_min / payroll * 100`.
    pub shortfall_share_pct: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p90_p10: Option<f64>,
    /// Among grades with at least one below-range employee.
    pub most_below_grade: Option<GradeCount>,
    pub fewest_below_grade: Option<GradeCount>,
}

/// Averages over the band table itself (nulls skipped).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub grade_count: usize,
    pub mean_spread_pct: Option<f64>,
    pub mean_mid_point_differential: Option<f64>,
    pub mean_range_overlap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenderBreakdown {
    /// Headcount per gender label.
    pub headcount: BTreeMap<String, usize>,
    pub male_mean: Option<f64>,
    pub female_mean: Option<f64>,
    pub male_median: Option<f64>,
    pub female_median: Option<f64>,
    /// `(1 - female_mean / male_mean) * 100`.
    pub mean_gap_pct: Option<f64>,
    pub median_gap_pct: Option<f64>,
    /// `male_mean - female_mean`.
    pub mean_gap_abs: Option<f64>,
    pub median_gap_abs: Option<f64>,
    /// Index 0 is the lowest-paid quarter.
    pub quartiles: Vec<BTreeMap<String, usize>>,
    pub by_grade: BTreeMap<Grade, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub summary: PaySummary,
    pub table: TableSummary,
    /// `None` when no employee carries a gender label.
    pub gender: Option<GenderBreakdown>,
    /// Employees whose grade has no band.
    pub unmatched: usize,
    #[serde(skip)]
    pub employees: Vec<EmployeeMetrics>,
}

/// Join employees to bands by grade. Returns the matched rows and the unmatched count.
pub fn employee_metrics(employees: &[Employee], table: &BandTable) -> (Vec<EmployeeMetrics>, usize) {
    let mut out = Vec::with_capacity(employees.len());
    let mut unmatched = 0usize;
    for e in employees {
        let Some(band) = table.get(e.grade) else {
            unmatched += 1;
            continue;
        };
        let width = band.max - band.min;
        out.push(EmployeeMetrics {
            id: e.id.clone(),
            job: e.job.clone(),
            grade: e.grade,
            gender: e.gender.clone(),
            pay: e.pay,
            range_min: band.min,
            range_mid: band.mid,
            range_max: band.max,
            compa_ratio: e.pay / band.mid,
            range_penetration: (width != 0.0).then(|| (e.pay - band.min) / width),
            below_min: e.pay < band.min,
            above_max: e.pay > band.max,
        });
    }
    (out, unmatched)
}

/// Compute the full metrics report for a workforce against a table.
pub fn compute_metrics(employees: &[Employee], table: &BandTable) -> Result<MetricsReport, AppError> {
    let (rows, unmatched) = employee_metrics(employees, table);
    if rows.is_empty() {
        return Err(AppError::insufficient_data(
            "No employee grade matches a grade in the pay-range table.",
        ));
    }
    let summary = summarize(&rows)
        .ok_or_else(|| AppError::numeric("Failed to summarize pay metrics."))?;
    Ok(MetricsReport {
        summary,
        table: summarize_table(table),
        gender: gender_breakdown(&rows),
        unmatched,
        employees: rows,
    })
}

fn summarize(rows: &[EmployeeMetrics]) -> Option<PaySummary> {
    let n = rows.len();
    let pays: Vec<f64> = rows.iter().map(|r| r.pay).collect();
    let compas: Vec<f64> = rows.iter().map(|r| r.compa_ratio).collect();
    let penetrations: Vec<f64> = rows.iter().filter_map(|r| r.range_penetration).collect();

    let below_count = rows.iter().filter(|r| r.below_min).count();
    let above_count = rows.iter().filter(|r| r.above_max).count();
    let within_count = n - below_count - above_count;
    let pct = |k: usize| k as f64 / n as f64 * 100.0;

    let payroll: f64 = pays.iter().sum();
    let shortfall_to_min: f64 = rows
        .iter()
        .filter(|r| r.below_min)
        .map(|r| r.range_min - r.pay)
        .sum();
    let excess_over_max: f64 = rows
        .iter()
        .filter(|r| r.above_max)
        .map(|r| r.range_max - r.pay)
        .sum();

    let p10 = quantile(&pays, 0.10)?;
    let p90 = quantile(&pays, 0.90)?;

    let mut below_by_grade: BTreeMap<Grade, usize> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.below_min) {
        *below_by_grade.entry(r.grade).or_default() += 1;
    }
    // Ties go to the lowest grade.
    let most_below_grade = below_by_grade
        .iter()
        .fold(None::<GradeCount>, |best, (&grade, &count)| match best {
            Some(b) if b.count >= count => Some(b),
            _ => Some(GradeCount { grade, count }),
        });
    let fewest_below_grade = below_by_grade
        .iter()
        .fold(None::<GradeCount>, |best, (&grade, &count)| match best {
            Some(b) if b.count <= count => Some(b),
            _ => Some(GradeCount { grade, count }),
        });

    let grades: BTreeSet<Grade> = rows.iter().map(|r| r.grade).collect();
    let jobs: BTreeSet<&str> = rows.iter().filter_map(|r| r.job.as_deref()).collect();

    Some(PaySummary {
        employee_count: n,
        grade_count: grades.len(),
        job_count: jobs.len(),
        payroll,
        mean_pay: mean(&pays)?,
        median_pay: median(&pays)?,
        compa_ratio: Distribution::of(&compas)?,
        range_penetration: Distribution::of(&penetrations),
        below_count,
        above_count,
        within_count,
        below_pct: pct(below_count),
        above_pct: pct(above_count),
        within_pct: pct(within_count),
        shortfall_to_min,
        excess_over_max,
        shortfall_share_pct: shortfall_to_min / payroll * 100.0,
        p10,
        p25: quantile(&pays, 0.25)?,
        p75: quantile(&pays, 0.75)?,
        p90,
        p90_p10: (p10 != 0.0).then(|| p90 / p10),
        most_below_grade,
        fewest_below_grade,
    })
}

pub fn summarize_table(table: &BandTable) -> TableSummary {
    let spreads: Vec<f64> = table.iter().map(|b| b.spread_pct).collect();
    let diffs: Vec<f64> = table.iter().filter_map(|b| b.mid_point_differential).collect();
    let overlaps: Vec<f64> = table.iter().filter_map(|b| b.range_overlap).collect();
    TableSummary {
        grade_count: table.len(),
        mean_spread_pct: mean(&spreads),
        mean_mid_point_differential: mean(&diffs),
        mean_range_overlap: mean(&overlaps),
    }
}

fn gender_breakdown(rows: &[EmployeeMetrics]) -> Option<GenderBreakdown> {
    let labelled: Vec<(&str, &EmployeeMetrics)> = rows
        .iter()
        .filter_map(|r| r.gender.as_deref().map(|g| (g, r)))
        .collect();
    if labelled.is_empty() {
        return None;
    }

    let mut headcount: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_grade: BTreeMap<Grade, BTreeMap<String, usize>> = BTreeMap::new();
    for (g, r) in &labelled {
        *headcount.entry(g.to_string()).or_default() += 1;
        *by_grade.entry(r.grade).or_default().entry(g.to_string()).or_default() += 1;
    }

    let pays_of = |label: &str| -> Vec<f64> {
        labelled
            .iter()
            .filter(|(g, _)| *g == label)
            .map(|(_, r)| r.pay)
            .collect()
    };
    let male = pays_of("Male");
    let female = pays_of("Female");
    let male_mean = mean(&male);
    let female_mean = mean(&female);
    let male_median = median(&male);
    let female_median = median(&female);

    let gap_pct = |m: Option<f64>, f: Option<f64>| match (m, f) {
        (Some(m), Some(f)) if m != 0.0 => Some((1.0 - f / m) * 100.0),
        _ => None,
    };
    let gap_abs = |m: Option<f64>, f: Option<f64>| Some(m? - f?);

    let pays: Vec<f64> = labelled.iter().map(|(_, r)| r.pay).collect();
    let mut quartiles = vec![BTreeMap::new(); 4];
    for (idx, q) in pay_quartiles(&pays).into_iter().enumerate() {
        *quartiles[q].entry(labelled[idx].0.to_string()).or_default() += 1;
    }

    Some(GenderBreakdown {
        headcount,
        male_mean,
        female_mean,
        male_median,
        female_median,
        mean_gap_pct: gap_pct(male_mean, female_mean),
        median_gap_pct: gap_pct(male_median, female_median),
        mean_gap_abs: gap_abs(male_mean, female_mean),
        median_gap_abs: gap_abs(male_median, female_median),
        quartiles,
        by_grade,
    })
}

/// Equal-count pay quartile (0..=3) for each value, in input order.
///
/// Values are ranked `1..=n` with ties broken by input position, and the rank
/// range is cut at the 25/50/75% points (`1 + (n - 1) * k / 4`); a rank on a
/// cut point belongs to the lower quarter.
pub fn pay_quartiles(pays: &[f64]) -> Vec<usize> {
    let n = pays.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| pays[a].total_cmp(&pays[b]));

    let mut rank = vec![0usize; n];
    for (r, &idx) in order.iter().enumerate() {
        rank[idx] = r + 1;
    }

    let cuts: Vec<f64> = (1..4)
        .map(|k| 1.0 + (n.saturating_sub(1)) as f64 * k as f64 / 4.0)
        .collect();
    rank.iter()
        .map(|&r| cuts.iter().filter(|&&c| r as f64 > c).count())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::derive_bands;
    use crate::domain::{BandWidth, GradeMid, MidSource};

    fn table() -> BandTable {
        // Grade 1: 80..120, grade 2: 160..240.
        let mids = [
            GradeMid { grade: 1, mid: 100.0, source: MidSource::Calculated },
            GradeMid { grade: 2, mid: 200.0, source: MidSource::Calculated },
        ];
        derive_bands(&mids, &BandWidth::default()).unwrap()
    }

    fn emp(grade: Grade, pay: f64, gender: &str, job: &str) -> Employee {
        Employee {
            id: None,
            job: Some(job.to_string()),
            grade,
            pay,
            gender: Some(gender.to_string()),
        }
    }

    fn workforce() -> Vec<Employee> {
        vec![
            emp(1, 70.0, "Female", "Clerk"),
            emp(1, 100.0, "Male", "Clerk"),
            emp(1, 130.0, "Male", "Clerk"),
            emp(2, 150.0, "Female", "Analyst"),
            emp(2, 200.0, "Female", "Analyst"),
            emp(2, 250.0, "Male", "Lead"),
            emp(9, 999.0, "Male", "Ghost"),
        ]
    }

    #[test]
    fn per_employee_metrics() {
        let (rows, unmatched) = employee_metrics(&workforce(), &table());
        assert_eq!(unmatched, 1);
        assert_eq!(rows.len(), 6);
        assert!((rows[0].compa_ratio - 0.7).abs() < 1e-12);
        assert!((rows[0].range_penetration.unwrap() + 0.25).abs() < 1e-12);
        assert!(rows[0].below_min && !rows[0].above_max);
        assert!((rows[1].range_penetration.unwrap() - 0.5).abs() < 1e-12);
        assert!(rows[2].above_max);
    }

    #[test]
    fn summary_matches_hand_computation() {
        let report = compute_metrics(&workforce(), &table()).unwrap();
        let s = &report.summary;
        assert_eq!(s.employee_count, 6);
        assert_eq!(s.grade_count, 2);
        assert_eq!(s.job_count, 3);
        assert_eq!((s.below_count, s.above_count, s.within_count), (2, 2, 2));
        // (80 - 70) + (160 - 150)
        assert!((s.shortfall_to_min - 20.0).abs() < 1e-9);
        // (120 - 130) + (240 - 250)
        assert!((s.excess_over_max + 20.0).abs() < 1e-9);
        assert!((s.payroll - 900.0).abs() < 1e-9);
        assert!((s.shortfall_share_pct - 20.0 / 9.0).abs() < 1e-9);
        assert!((s.median_pay - 140.0).abs() < 1e-9);
        // pays sorted: 70 100 130 150 200 250; p10 at pos 0.5
        assert!((s.p10 - 85.0).abs() < 1e-9);
        assert_eq!(s.most_below_grade, Some(GradeCount { grade: 1, count: 1 }));
        assert_eq!(s.fewest_below_grade, Some(GradeCount { grade: 1, count: 1 }));
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn gender_gap_and_quartiles() {
        let report = compute_metrics(&workforce(), &table()).unwrap();
        let g = report.gender.unwrap();
        assert_eq!(g.headcount["Male"], 3);
        assert_eq!(g.headcount["Female"], 3);
        let m = (100.0 + 130.0 + 250.0) / 3.0;
        let f = (70.0 + 150.0 + 200.0) / 3.0;
        assert!((g.mean_gap_pct.unwrap() - (1.0 - f / m) * 100.0).abs() < 1e-9);
        assert!((g.mean_gap_abs.unwrap() - (m - f)).abs() < 1e-9);
        assert_eq!(g.by_grade[&2]["Female"], 2);
        let total: usize = g.quartiles.iter().flat_map(|q| q.values()).sum();
        assert_eq!(total, 6);
        assert_eq!(g.quartiles[0]["Female"], 1);
    }

    #[test]
    fn quartiles_break_ties_by_position() {
        // cuts at 2.75, 4.5, 6.25 for n = 8
        let q = pay_quartiles(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0]);
        assert_eq!(q, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        let q = pay_quartiles(&[40.0, 10.0, 30.0, 20.0]);
        assert_eq!(q, vec![3, 0, 2, 1]);
    }

    #[test]
    fn no_matching_grade_is_insufficient_data() {
        let err = compute_metrics(&[emp(7, 10.0, "Male", "X")], &table()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
