//! Synthetic workforce generation.
//!
//! Produces an employee file with both `Base Pay` and `Target Pay`, so any
//! strategy can run against it. Pay grows geometrically with grade and carries
//! mean-one lognormal noise. Some grades can be left empty to exercise gap
//! filling.

use std::fs::File;
use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::Serialize;

use crate::domain::{Employee, Grade};
use crate::error::AppError;

const JOB_FAMILIES: [&str; 5] = ["Analyst", "Engineer", "Specialist", "Coordinator", "Consultant"];
const LEVEL_TITLES: [&str; 4] = ["Associate", "", "Senior", "Principal"];

#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub count: usize,
    /// Grades `1..=grades`.
    pub grades: Grade,
    /// Expected base pay at grade 1.
    pub base_pay: f64,
    /// Expected pay increase from one grade to the next, in percent.
    pub grade_step_pct: f64,
    /// Standard deviation of log pay within a grade.
    pub noise_sigma: f64,
    pub female_share: f64,
    /// Female pay is scaled by `1 - gender_gap_pct / 100`.
    pub gender_gap_pct: f64,
    /// Grades that get no employees.
    pub empty_grades: Vec<Grade>,
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            count: 500,
            grades: 12,
            base_pay: 32_000.0,
            grade_step_pct: 12.0,
            noise_sigma: 0.12,
            female_share: 0.5,
            gender_gap_pct: 4.0,
            empty_grades: Vec::new(),
            seed: 42,
        }
    }
}

/// A generated employee plus the market rate for their grade.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEmployee {
    pub employee: Employee,
    pub target_pay: f64,
}

#[derive(Debug, Serialize)]
struct SampleRecord<'a> {
    #[serde(rename = "Employee ID")]
    id: &'a str,
    #[serde(rename = "Grade")]
    grade: Grade,
    #[serde(rename = "Job")]
    job: &'a str,
    #[serde(rename = "Base Pay")]
    base_pay: f64,
    #[serde(rename = "Target Pay")]
    target_pay: f64,
    #[serde(rename = "Gender")]
    gender: &'a str,
}

pub fn generate_workforce(config: &SampleConfig) -> Result<Vec<SampleEmployee>, AppError> {
    validate(config)?;

    let grades: Vec<Grade> = (1..=config.grades)
        .filter(|g| !config.empty_grades.contains(g))
        .collect();
    if grades.is_empty() {
        return Err(AppError::input("Every grade is marked empty; nothing to generate."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let pay_noise = Normal::new(0.0, config.noise_sigma)
        .map_err(|e| AppError::numeric(format!("Noise distribution error: {e}")))?;
    // Market benchmarks are far less dispersed than individual pay.
    let market_noise = Normal::new(0.0, config.noise_sigma / 4.0)
        .map_err(|e| AppError::numeric(format!("Noise distribution error: {e}")))?;

    let growth = 1.0 + config.grade_step_pct / 100.0;
    let gap = 1.0 - config.gender_gap_pct / 100.0;
    // Shifts lognormal noise to mean one.
    let drift = -0.5 * config.noise_sigma * config.noise_sigma;

    let mut out = Vec::with_capacity(config.count);
    for i in 0..config.count {
        let grade = grades[rng.gen_range(0..grades.len())];
        let expected = config.base_pay * growth.powi((grade - 1) as i32);

        let female = rng.gen_bool(config.female_share);
        let z: f64 = pay_noise.sample(&mut rng);
        let mut pay = expected * (z + drift).exp();
        if female {
            pay *= gap;
        }
        let target_pay = expected * market_noise.sample(&mut rng).exp();

        let family = JOB_FAMILIES[rng.gen_range(0..JOB_FAMILIES.len())];
        out.push(SampleEmployee {
            employee: Employee {
                id: Some(format!("E{:05}", i + 1)),
                job: Some(job_title(family, grade, config.grades)),
                grade,
                pay: round_cents(pay),
                gender: Some(if female { "Female" } else { "Male" }.to_string()),
            },
            target_pay: round_cents(target_pay),
        });
    }
    Ok(out)
}

/// Write a generated workforce in the input-file layout.
pub fn write_workforce_csv(path: &Path, workforce: &[SampleEmployee]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create sample CSV '{}': {e}", path.display())))?;
    let mut wtr = csv::Writer::from_writer(file);
    for s in workforce {
        let e = &s.employee;
        wtr.serialize(SampleRecord {
            id: e.id.as_deref().unwrap_or(""),
            grade: e.grade,
            job: e.job.as_deref().unwrap_or(""),
            base_pay: e.pay,
            target_pay: s.target_pay,
            gender: e.gender.as_deref().unwrap_or(""),
        })
        .map_err(|e| AppError::input(format!("Failed to write sample row: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::input(format!("Failed to flush sample CSV: {e}")))?;
    Ok(())
}

fn validate(config: &SampleConfig) -> Result<(), AppError> {
    if config.count == 0 {
        return Err(AppError::input("Sample count must be > 0."));
    }
    if config.grades < 1 {
        return Err(AppError::input("Sample needs at least one grade."));
    }
    if !(config.base_pay.is_finite() && config.base_pay > 0.0) {
        return Err(AppError::input("Sample base pay must be > 0."));
    }
    if !(config.grade_step_pct.is_finite() && config.grade_step_pct > -100.0) {
        return Err(AppError::input("Sample grade step must be > -100%."));
    }
    if !(config.noise_sigma.is_finite() && config.noise_sigma >= 0.0) {
        return Err(AppError::input("Sample noise must be >= 0."));
    }
    if !(0.0..=1.0).contains(&config.female_share) {
        return Err(AppError::input("Female share must be in [0, 1]."));
    }
    if !(config.gender_gap_pct.is_finite() && config.gender_gap_pct < 100.0) {
        return Err(AppError::input("Gender gap must be < 100%."));
    }
    Ok(())
}

fn job_title(family: &str, grade: Grade, grades: Grade) -> String {
    let tier = ((grade - 1) * LEVEL_TITLES.len() as Grade / grades.max(1)) as usize;
    match LEVEL_TITLES[tier.min(LEVEL_TITLES.len() - 1)] {
        "" => family.to_string(),
        level => format!("{level} {family}"),
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_workforce() {
        let config = SampleConfig {
            count: 50,
            ..SampleConfig::default()
        };
        assert_eq!(generate_workforce(&config).unwrap(), generate_workforce(&config).unwrap());
    }

    #[test]
    fn empty_grades_stay_empty() {
        let config = SampleConfig {
            count: 300,
            grades: 6,
            empty_grades: vec![3, 4],
            ..SampleConfig::default()
        };
        let workforce = generate_workforce(&config).unwrap();
        assert_eq!(workforce.len(), 300);
        assert!(workforce.iter().all(|s| ![3, 4].contains(&s.employee.grade)));
        assert!(workforce.iter().all(|s| (1..=6).contains(&s.employee.grade)));
        assert!(workforce.iter().all(|s| s.employee.pay > 0.0 && s.target_pay > 0.0));
    }

    #[test]
    fn job_titles_follow_seniority() {
        assert_eq!(job_title("Analyst", 1, 12), "Associate Analyst");
        assert_eq!(job_title("Analyst", 5, 12), "Analyst");
        assert_eq!(job_title("Analyst", 12, 12), "Principal Analyst");
    }

    #[test]
    fn rejects_bad_share() {
        let config = SampleConfig {
            female_share: 1.5,
            ..SampleConfig::default()
        };
        assert_eq!(generate_workforce(&config).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn written_file_is_ingestible() {
        use crate::domain::PayColumn;
        use crate::io::ingest::load_employees;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        let workforce = generate_workforce(&SampleConfig::default()).unwrap();
        write_workforce_csv(&path, &workforce).unwrap();

        let data = load_employees(&path, PayColumn::TargetPay, 10).unwrap();
        assert_eq!(data.rows_used, workforce.len());
        assert!(data.row_errors.is_empty());
        assert_eq!(data.employees[0].gender.as_deref(), workforce[0].employee.gender.as_deref());
    }
}
