//! Daily dashboard built from the combined session sheets.
//!
//! Unlike the overview pass, this one concatenates every xlsx report's rows
//! and works with lower-cased headers, the contract the generated session
//! sheets follow. Per-student totals here use distinct (date, subject)
//! sessions as the denominator rather than raw report counts.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::sheet;
use crate::store::{self, ObjectStore};

const REQUIRED_COLUMNS: &[&str] = &["date", "subject", "student name", "er number", "status"];

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboardRow {
    pub name: String,
    pub er_number: String,
    pub present_count: usize,
    pub total_classes: usize,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyTrendPoint {
    pub date: NaiveDate,
    /// Distinct students present on this day.
    pub attendance: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectShare {
    pub subject: String,
    pub present: usize,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub students: Vec<StudentDashboardRow>,
    pub daily_trend: Vec<DailyTrendPoint>,
    pub subject_distribution: Vec<SubjectShare>,
    pub avg_attendance_pct: f64,
}

#[derive(Debug)]
struct SessionRow {
    date: NaiveDate,
    subject: String,
    student_name: String,
    er_number: String,
    present: bool,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Builds the per-student daily dashboard from every xlsx session sheet.
///
/// An empty file set is the no-reports validation failure; missing required
/// columns across the combined rows are the missing-columns failure.
pub async fn build_dashboard(
    store: &dyn ObjectStore,
    cfg: &AppConfig,
) -> Result<Dashboard, PipelineError> {
    let objects = store::list_all(store, &cfg.reports_prefix)
        .await
        .map_err(PipelineError::StoreUnavailable)?;

    let files: Vec<_> = objects
        .into_iter()
        .filter(|obj| obj.key.to_ascii_lowercase().ends_with(".xlsx"))
        .filter(|obj| !obj.file_name().eq_ignore_ascii_case(cfg.roster_file_name()))
        .collect();

    if files.is_empty() {
        return Err(PipelineError::NoReports {
            prefix: cfg.reports_prefix.clone(),
        });
    }

    let mut rows: Vec<SessionRow> = Vec::new();
    let mut seen_columns: BTreeSet<String> = BTreeSet::new();

    for obj in &files {
        let bytes = store
            .get(&obj.key)
            .await
            .map_err(PipelineError::StoreUnavailable)?;
        let table = match sheet::parse_xlsx(&bytes) {
            Ok(table) => table,
            Err(e) => {
                debug!(key = %obj.key, error = %e, "Skipping unreadable session sheet");
                continue;
            }
        };

        let headers: Vec<String> = table
            .headers
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();
        seen_columns.extend(headers.iter().cloned());
        rows.extend(collect_rows(&headers, &table.rows));
    }

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !seen_columns.contains(**column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::MissingColumns { columns: missing });
    }

    Ok(summarize(&rows))
}

fn collect_rows(headers: &[String], data: &[Vec<String>]) -> Vec<SessionRow> {
    let idx = |name: &str| headers.iter().position(|h| h == name);
    let (Some(date_i), Some(subject_i), Some(name_i), Some(er_i), Some(status_i)) = (
        idx("date"),
        idx("subject"),
        idx("student name"),
        idx("er number"),
        idx("status"),
    ) else {
        return Vec::new();
    };

    data.iter()
        .filter_map(|row| {
            // Rows with unparseable dates are dropped, mirroring the trend
            // handling in the overview.
            let date = parse_session_date(row.get(date_i)?)?;
            Some(SessionRow {
                date,
                subject: row.get(subject_i).cloned().unwrap_or_default(),
                student_name: row.get(name_i).cloned().unwrap_or_default(),
                er_number: row.get(er_i).cloned().unwrap_or_default(),
                present: row
                    .get(status_i)
                    .is_some_and(|s| s.eq_ignore_ascii_case("present")),
            })
        })
        .collect()
}

fn parse_session_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn summarize(rows: &[SessionRow]) -> Dashboard {
    let total_classes = rows
        .iter()
        .map(|r| (r.date, r.subject.as_str()))
        .collect::<BTreeSet<_>>()
        .len();

    let mut all_students: BTreeSet<(&str, &str)> = BTreeSet::new();
    let mut present_sessions: BTreeSet<(NaiveDate, &str, &str, &str)> = BTreeSet::new();
    for row in rows {
        all_students.insert((row.student_name.as_str(), row.er_number.as_str()));
        if row.present {
            present_sessions.insert((
                row.date,
                row.subject.as_str(),
                row.student_name.as_str(),
                row.er_number.as_str(),
            ));
        }
    }

    let mut present_counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for (_, _, name, er) in &present_sessions {
        *present_counts.entry((name, er)).or_default() += 1;
    }

    let students = all_students
        .iter()
        .map(|(name, er)| {
            let present = present_counts.get(&(name, er)).copied().unwrap_or(0);
            let percentage = if total_classes > 0 {
                round1(present as f64 / total_classes as f64 * 100.0)
            } else {
                0.0
            };
            StudentDashboardRow {
                name: name.to_string(),
                er_number: er.to_string(),
                present_count: present,
                total_classes,
                attendance_percentage: percentage,
            }
        })
        .collect();

    let mut per_day: BTreeMap<NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    let mut per_subject: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.present) {
        per_day.entry(row.date).or_default().insert(&row.er_number);
        per_subject
            .entry(&row.subject)
            .or_default()
            .insert(&row.er_number);
    }

    let daily_trend = per_day
        .iter()
        .map(|(date, ers)| DailyTrendPoint {
            date: *date,
            attendance: ers.len(),
        })
        .collect();

    let subject_distribution = per_subject
        .iter()
        .map(|(subject, ers)| SubjectShare {
            subject: subject.to_string(),
            present: ers.len(),
        })
        .collect();

    let total_students = rows
        .iter()
        .map(|r| r.er_number.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let day_count = rows.iter().map(|r| r.date).collect::<BTreeSet<_>>().len();
    let present_day_pairs = rows
        .iter()
        .filter(|r| r.present)
        .map(|r| (r.date, r.er_number.as_str()))
        .collect::<BTreeSet<_>>()
        .len();

    let avg_attendance_pct = if total_students * day_count > 0 {
        round1(present_day_pairs as f64 / (total_students * day_count) as f64 * 100.0)
    } else {
        0.0
    };

    Dashboard {
        students,
        daily_trend,
        subject_distribution,
        avg_attendance_pct,
    }
}
