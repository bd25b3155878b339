use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::rows::ReportRow;

//
// ─── OUTPUT SHAPES ─────────────────────────────────────────────────────────────
//

/// Label/value pairs for one chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub data: Vec<u64>,
}

/// Tabular payload for exports (CSV/PDF encoding is out of scope).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Headline numbers for the certificates dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverviewStats {
    pub total_attempts: u64,
    pub approved: u64,
    pub failed: u64,
    pub approval_rate: f64,
}

/// One course in the top-courses ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub course_title: String,
    pub course_code: String,
    pub program: Option<String>,
    pub certificates: u64,
    pub avg_grade: f64,
}

/// Histogram bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Monthly,
    Quarterly,
    Yearly,
}

impl Period {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
        }
    }
}

/// Which sitting timestamp a histogram buckets on.
///
/// One parameterized histogram replaces the per-field near-duplicates the
/// dashboards would otherwise accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    CompletedAt,
    ApprovedAt,
}

impl DateField {
    fn of(self, row: &ReportRow) -> Option<DateTime<Utc>> {
        match self {
            DateField::CompletedAt => row.completed_at,
            DateField::ApprovedAt => row.approved_at,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DateField::CompletedAt => "completed_at",
            DateField::ApprovedAt => "approved_at",
        }
    }
}

//
// ─── OVERVIEW ──────────────────────────────────────────────────────────────────
//

/// Attempt/approval counts over completed sittings.
#[must_use]
pub fn overview(rows: &[&ReportRow]) -> OverviewStats {
    let total_attempts = rows.iter().filter(|r| r.complete).count() as u64;
    let approved = rows.iter().filter(|r| r.approved()).count() as u64;
    let failed = total_attempts - approved;
    let approval_rate = if total_attempts > 0 {
        approved as f64 / total_attempts as f64 * 100.0
    } else {
        0.0
    };
    OverviewStats {
        total_attempts,
        approved,
        failed,
        approval_rate,
    }
}

//
// ─── HISTOGRAM ─────────────────────────────────────────────────────────────────
//

fn months_in_range(from: NaiveDate, to: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    loop {
        months.push((year, month));
        if (year, month) >= (to.year(), to.month()) {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    months
}

fn month_label(year: i32, month: u32, with_year: bool) -> String {
    let date = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default();
    if with_year {
        date.format("%b %Y").to_string()
    } else {
        date.format("%b").to_string()
    }
}

/// Histogram of approved sittings, bucketed on the given date field.
///
/// Monthly buckets cover the filtered date range when one is active and
/// the current year otherwise; quarterly buckets cover the current year;
/// yearly buckets cover the last four years. Approved rows missing the
/// bucketing timestamp are skipped and logged, never fatal.
#[must_use]
pub fn approvals_histogram(
    rows: &[&ReportRow],
    period: Period,
    field: DateField,
    range: Option<(NaiveDate, NaiveDate)>,
    today: NaiveDate,
) -> ChartData {
    let dated: Vec<(&ReportRow, DateTime<Utc>)> = rows
        .iter()
        .filter(|r| r.approved())
        .filter_map(|row| match field.of(row) {
            Some(at) => Some((*row, at)),
            None => {
                tracing::warn!(
                    sitting = %row.sitting_id,
                    field = field.name(),
                    "skipping approved sitting without bucketing timestamp"
                );
                None
            }
        })
        .collect();

    match period {
        Period::Monthly => {
            let (buckets, with_year) = match range {
                Some((from, to)) => (months_in_range(from, to), true),
                None => ((1..=12).map(|m| (today.year(), m)).collect(), false),
            };

            let mut counts: HashMap<(i32, u32), u64> = HashMap::new();
            for (_, at) in &dated {
                *counts.entry((at.year(), at.month())).or_default() += 1;
            }

            let labels = buckets
                .iter()
                .map(|&(y, m)| month_label(y, m, with_year))
                .collect();
            let data = buckets
                .iter()
                .map(|key| counts.get(key).copied().unwrap_or(0))
                .collect();
            ChartData { labels, data }
        }
        Period::Quarterly => {
            let mut counts = [0_u64; 4];
            for (_, at) in &dated {
                if at.year() == today.year() {
                    counts[((at.month() - 1) / 3) as usize] += 1;
                }
            }
            ChartData {
                labels: vec![
                    "Q1 (Jan-Mar)".to_owned(),
                    "Q2 (Apr-Jun)".to_owned(),
                    "Q3 (Jul-Sep)".to_owned(),
                    "Q4 (Oct-Dec)".to_owned(),
                ],
                data: counts.to_vec(),
            }
        }
        Period::Yearly => {
            let years: Vec<i32> = (today.year() - 3..=today.year()).collect();
            let mut counts: HashMap<i32, u64> = HashMap::new();
            for (_, at) in &dated {
                *counts.entry(at.year()).or_default() += 1;
            }
            ChartData {
                labels: years.iter().map(ToString::to_string).collect(),
                data: years
                    .iter()
                    .map(|y| counts.get(y).copied().unwrap_or(0))
                    .collect(),
            }
        }
    }
}

//
// ─── DISTRIBUTIONS ─────────────────────────────────────────────────────────────
//

fn ranked(counts: HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    // count desc, then label for a stable order between equal counts
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// Approved certificates per program, top 8.
#[must_use]
pub fn program_distribution(rows: &[&ReportRow]) -> ChartData {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for row in rows.iter().filter(|r| r.approved()) {
        if let Some(program) = &row.program {
            *counts.entry(program.clone()).or_default() += 1;
        }
    }

    let entries = ranked(counts);
    let top = entries.into_iter().take(8);
    let (labels, data) = top.unzip();
    ChartData { labels, data }
}

/// Label for approved holders who declared no employer.
pub const NO_COMPANY_LABEL: &str = "No company";
/// Bucket absorbing everything below the top ten companies.
pub const OTHER_COMPANIES_LABEL: &str = "Other";

/// Approved certificates per declared employer: top 10, an "Other" bucket
/// for the rest, and a "No company" bucket for undeclared.
#[must_use]
pub fn company_distribution(rows: &[&ReportRow]) -> ChartData {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for row in rows.iter().filter(|r| r.approved()) {
        let bucket = row
            .declared_company()
            .unwrap_or(NO_COMPANY_LABEL)
            .to_owned();
        *counts.entry(bucket).or_default() += 1;
    }

    let entries = ranked(counts);
    if entries.len() <= 10 {
        let (labels, data) = entries.into_iter().unzip();
        return ChartData { labels, data };
    }

    let mut labels = Vec::with_capacity(11);
    let mut data = Vec::with_capacity(11);
    let mut other = 0;
    for (i, (label, count)) in entries.into_iter().enumerate() {
        if i < 10 {
            labels.push(label);
            data.push(count);
        } else {
            other += count;
        }
    }
    if other > 0 {
        labels.push(OTHER_COMPANIES_LABEL.to_owned());
        data.push(other);
    }
    ChartData { labels, data }
}

/// Approved certificates by declared gender; unspecified rows are excluded.
#[must_use]
pub fn gender_distribution(rows: &[&ReportRow]) -> ChartData {
    let mut male = 0;
    let mut female = 0;
    for row in rows.iter().filter(|r| r.approved()) {
        match row.gender {
            Some(super::rows::Gender::Male) => male += 1,
            Some(super::rows::Gender::Female) => female += 1,
            None => {}
        }
    }
    ChartData {
        labels: vec!["Male".to_owned(), "Female".to_owned()],
        data: vec![male, female],
    }
}

//
// ─── COURSES ───────────────────────────────────────────────────────────────────
//

/// Top 10 courses by certificates issued.
///
/// Only the latest passing attempt per (user, course) counts, so retakes
/// never inflate a course's numbers. Grades average on the 0-20 scale.
#[must_use]
pub fn top_courses(rows: &[&ReportRow]) -> Vec<CourseSummary> {
    let mut latest: HashMap<(u64, u64), &ReportRow> = HashMap::new();
    for row in rows.iter().filter(|r| r.approved()) {
        let Some(completed) = row.completed_at else {
            tracing::warn!(
                sitting = %row.sitting_id,
                "skipping approved sitting without completion timestamp"
            );
            continue;
        };
        let key = (row.user_id.value(), row.course_id.value());
        match latest.get(&key) {
            Some(kept) if kept.completed_at >= Some(completed) => {}
            _ => {
                latest.insert(key, row);
            }
        }
    }

    let mut grouped: HashMap<(String, String, Option<String>), (u64, f64)> = HashMap::new();
    for row in latest.values() {
        let key = (
            row.course_title.clone(),
            row.course_code.clone(),
            row.program.clone(),
        );
        let entry = grouped.entry(key).or_default();
        entry.0 += 1;
        entry.1 += row.grade_0_to_20();
    }

    let mut summaries: Vec<CourseSummary> = grouped
        .into_iter()
        .map(|((title, code, program), (count, grade_sum))| CourseSummary {
            course_title: title,
            course_code: code,
            program,
            certificates: count,
            avg_grade: grade_sum / count as f64,
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.certificates
            .cmp(&a.certificates)
            .then_with(|| a.course_code.cmp(&b.course_code))
    });
    summaries.truncate(10);
    summaries
}

/// Completed sittings banded on the 0-20 grade scale.
#[must_use]
pub fn score_distribution(rows: &[&ReportRow]) -> ChartData {
    let mut bands = [0_u64; 5];
    for row in rows.iter().filter(|r| r.complete) {
        let grade = row.grade_0_to_20();
        let band = if grade >= 18.0 {
            0
        } else if grade >= 15.0 {
            1
        } else if grade >= 12.0 {
            2
        } else if grade >= 9.0 {
            3
        } else {
            4
        };
        bands[band] += 1;
    }
    ChartData {
        labels: vec![
            "18-20 (Excellent)".to_owned(),
            "15-17 (Very good)".to_owned(),
            "12-14 (Good)".to_owned(),
            "9-11 (Fair)".to_owned(),
            "Below 9".to_owned(),
        ],
        data: bands.to_vec(),
    }
}

//
// ─── TABLES ────────────────────────────────────────────────────────────────────
//

fn format_date(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_owned(), |d| d.format("%d/%m/%Y").to_string())
}

/// Flat certificate listing for exports, newest completion first.
#[must_use]
pub fn certificates_table(rows: &[&ReportRow]) -> TableData {
    let mut sorted: Vec<&&ReportRow> = rows.iter().collect();
    sorted.sort_by_key(|row| std::cmp::Reverse((row.completed_at, row.sitting_id.value())));

    let table_rows = sorted
        .into_iter()
        .map(|row| {
            vec![
                row.full_name.clone(),
                row.course_title.clone(),
                row.program.clone().unwrap_or_else(|| "-".to_owned()),
                format!("{}%", row.percent_correct),
                if row.approved() { "Approved" } else { "Failed" }.to_owned(),
                format_date(row.completed_at),
                row.certificate_code.clone().unwrap_or_else(|| "-".to_owned()),
            ]
        })
        .collect();

    TableData {
        headers: vec![
            "Participant".to_owned(),
            "Course".to_owned(),
            "Program".to_owned(),
            "Score".to_owned(),
            "Status".to_owned(),
            "Completed".to_owned(),
            "Certificate code".to_owned(),
        ],
        rows: table_rows,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
