//! Cross-report dashboard aggregates.
//!
//! This is an independent pass over the raw file listing with its own column
//! contract (`Subject`/`Batch`/`Status`/`ER Number`/`Date`), distinct from
//! the presence-by-name contract the report loader uses. The two pipelines
//! are deliberately kept separate; merging them would silently change
//! dashboard numbers.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::roster;
use crate::sheet::{self, Table};
use crate::store::{self, ObjectStore};

/// One subject/batch row of the overview. The merge semantics are
/// intentionally asymmetric: mean for the rate, sum for raw present counts,
/// max for the denominator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: String,
    pub batch: String,
    pub attendance: f64,
    pub present_count: usize,
    pub total_count: usize,
}

/// Present-student count for one month, contributed by one source file.
/// Distinct files yield distinct rows; there is no cross-file merge.
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub month: String,
    pub attendance: usize,
    pub subject_batch: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub avg_attendance: f64,
    pub total_students: usize,
    pub active_subjects: usize,
    pub best_subject: Option<String>,
    pub best_batch: Option<String>,
    pub subjects: Vec<SubjectSummary>,
    pub trend: Vec<TrendPoint>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Builds the overview dashboard: per-subject/batch averages, monthly trend
/// buckets and global stats.
///
/// Fails with the no-reports error when not a single report file exists;
/// individual unreadable or column-poor files degrade to zero contributions
/// and the pass continues.
pub async fn build_overview(
    store: &dyn ObjectStore,
    cfg: &AppConfig,
) -> Result<Overview, PipelineError> {
    let master = roster::load_master_roster(store, &cfg.roster_key).await;
    let total_students = master.total_students();

    let objects = store::list_all(store, &cfg.reports_prefix)
        .await
        .map_err(PipelineError::StoreUnavailable)?;

    let mut per_file: Vec<SubjectSummary> = Vec::new();
    let mut trend: Vec<TrendPoint> = Vec::new();
    let mut report_seen = false;

    for obj in objects {
        if !sheet::is_report_file(&obj.key) {
            continue;
        }
        if obj.file_name().eq_ignore_ascii_case(cfg.roster_file_name()) {
            continue;
        }
        report_seen = true;

        let bytes = store
            .get(&obj.key)
            .await
            .map_err(PipelineError::StoreUnavailable)?;
        let table = match sheet::parse_table(&obj.key, &bytes) {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => continue,
            Err(e) => {
                debug!(key = %obj.key, error = %e, "Skipping unreadable file in overview");
                continue;
            }
        };

        let subject = table.cell(0, "Subject").unwrap_or("Unknown").to_string();
        let batch = table.cell(0, "Batch").unwrap_or("Unknown").to_string();

        let present_count = distinct_present(&table).len();
        let total_count = total_students.max(1);
        let attendance = round2(present_count as f64 / total_count as f64 * 100.0);

        trend.extend(monthly_trend(&table, &subject, &batch));
        per_file.push(SubjectSummary {
            subject,
            batch,
            attendance,
            present_count,
            total_count,
        });
    }

    if !report_seen {
        return Err(PipelineError::NoReports {
            prefix: cfg.reports_prefix.clone(),
        });
    }

    let subjects = merge_by_subject_batch(per_file);

    let avg_attendance = if subjects.is_empty() {
        0.0
    } else {
        round2(subjects.iter().map(|s| s.attendance).sum::<f64>() / subjects.len() as f64)
    };

    let (best_subject, best_batch) = match subjects
        .iter()
        .max_by(|a, b| a.attendance.total_cmp(&b.attendance))
    {
        Some(best) => (Some(best.subject.clone()), Some(best.batch.clone())),
        None => (None, None),
    };

    Ok(Overview {
        avg_attendance,
        total_students,
        active_subjects: subjects.len(),
        best_subject,
        best_batch,
        subjects,
        trend,
    })
}

/// Distinct enrollment numbers whose `Status` is `present`, case-insensitive.
/// Either column missing means a zero count, not an error.
fn distinct_present(table: &Table) -> HashSet<String> {
    let (Some(status_idx), Some(er_idx)) =
        (table.column_index("Status"), table.column_index("ER Number"))
    else {
        return HashSet::new();
    };

    table
        .rows
        .iter()
        .filter(|row| {
            row.get(status_idx)
                .is_some_and(|s| s.eq_ignore_ascii_case("present"))
        })
        .filter_map(|row| row.get(er_idx))
        .filter(|er| !er.is_empty())
        .cloned()
        .collect()
}

/// Present counts bucketed by month abbreviation for one file. `Date` values
/// that do not parse as `DD-MM-YYYY` are dropped before counting.
fn monthly_trend(table: &Table, subject: &str, batch: &str) -> Vec<TrendPoint> {
    let (Some(date_idx), Some(status_idx), Some(er_idx)) = (
        table.column_index("Date"),
        table.column_index("Status"),
        table.column_index("ER Number"),
    ) else {
        return Vec::new();
    };

    let mut by_month: BTreeMap<String, HashSet<String>> = BTreeMap::new();
    for row in &table.rows {
        if !row
            .get(status_idx)
            .is_some_and(|s| s.eq_ignore_ascii_case("present"))
        {
            continue;
        }
        let Some(date) = row
            .get(date_idx)
            .and_then(|d| NaiveDate::parse_from_str(d, "%d-%m-%Y").ok())
        else {
            continue;
        };
        let Some(er) = row.get(er_idx).filter(|er| !er.is_empty()) else {
            continue;
        };
        by_month
            .entry(date.format("%b").to_string())
            .or_default()
            .insert(er.clone());
    }

    by_month
        .into_iter()
        .map(|(month, ers)| TrendPoint {
            month,
            attendance: ers.len(),
            subject_batch: format!("{subject} ({batch})"),
        })
        .collect()
}

fn merge_by_subject_batch(rows: Vec<SubjectSummary>) -> Vec<SubjectSummary> {
    let mut grouped: BTreeMap<(String, String), Vec<SubjectSummary>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.subject.clone(), row.batch.clone()))
            .or_default()
            .push(row);
    }

    grouped
        .into_iter()
        .map(|((subject, batch), group)| SubjectSummary {
            subject,
            batch,
            attendance: group.iter().map(|g| g.attendance).sum::<f64>() / group.len() as f64,
            present_count: group.iter().map(|g| g.present_count).sum(),
            total_count: group.iter().map(|g| g.total_count).max().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::write_workbook;
    use crate::store::MemoryStore;

    fn test_config() -> AppConfig {
        AppConfig {
            region: "ap-south-1".into(),
            bucket: "test".into(),
            reports_prefix: "reports/".into(),
            roster_key: "reports/students.xlsx".into(),
            registry_key: "students.xlsx".into(),
            collection_id: "students".into(),
        }
    }

    fn roster_workbook(names: usize) -> Vec<u8> {
        let mut rows = vec![vec![
            "Batch".to_string(),
            "Section".to_string(),
            "Name".to_string(),
        ]];
        for i in 0..names {
            rows.push(vec![
                "2021-25".to_string(),
                "A".to_string(),
                format!("Student {i}"),
            ]);
        }
        write_workbook(&[("Sheet1".to_string(), rows)]).unwrap()
    }

    fn session_csv(subject: &str, batch: &str, rows: &[(&str, &str, &str)]) -> Vec<u8> {
        let mut body = String::from("ER Number,Subject,Batch,Date,Status\n");
        for (er, date, status) in rows {
            body.push_str(&format!("{er},{subject},{batch},{date},{status}\n"));
        }
        body.into_bytes()
    }

    async fn store_with_two_os_files() -> MemoryStore {
        let store = MemoryStore::new(10);
        store.insert("reports/students.xlsx", roster_workbook(4));
        // 2 of 4 present, then 1 of 4 present.
        store.insert(
            "reports/20250110_2021-25_A_OS.csv",
            session_csv(
                "Operating System",
                "2021-25",
                &[
                    ("101", "10-01-2025", "Present"),
                    ("102", "10-01-2025", "present"),
                    ("103", "10-01-2025", "Absent"),
                ],
            ),
        );
        store.insert(
            "reports/20250210_2021-25_A_OS.csv",
            session_csv(
                "Operating System",
                "2021-25",
                &[("101", "10-02-2025", "Present"), ("102", "10-02-2025", "Absent")],
            ),
        );
        store
    }

    #[tokio::test]
    async fn test_merge_is_mean_sum_max() {
        let store = store_with_two_os_files().await;
        let overview = build_overview(&store, &test_config()).await.unwrap();

        assert_eq!(overview.subjects.len(), 1);
        let row = &overview.subjects[0];
        assert_eq!(row.subject, "Operating System");
        assert_eq!(row.batch, "2021-25");
        // File rates are 50.0 and 25.0; merged rate is their mean.
        assert_eq!(row.attendance, 37.5);
        assert_eq!(row.present_count, 3);
        assert_eq!(row.total_count, 4);

        assert_eq!(overview.avg_attendance, 37.5);
        assert_eq!(overview.active_subjects, 1);
        assert_eq!(overview.best_subject.as_deref(), Some("Operating System"));
        assert_eq!(overview.best_batch.as_deref(), Some("2021-25"));
        assert_eq!(overview.total_students, 4);
    }

    #[tokio::test]
    async fn test_trend_rows_are_per_file_per_month() {
        let store = store_with_two_os_files().await;
        let overview = build_overview(&store, &test_config()).await.unwrap();

        assert_eq!(overview.trend.len(), 2);
        let months: Vec<&str> = overview.trend.iter().map(|t| t.month.as_str()).collect();
        assert!(months.contains(&"Jan"));
        assert!(months.contains(&"Feb"));
        for point in &overview.trend {
            assert_eq!(point.subject_batch, "Operating System (2021-25)");
        }
    }

    #[tokio::test]
    async fn test_unparseable_dates_are_dropped_from_trend() {
        let store = MemoryStore::new(10);
        store.insert("reports/students.xlsx", roster_workbook(2));
        store.insert(
            "reports/20250110_2021-25_A_OS.csv",
            session_csv(
                "Operating System",
                "2021-25",
                &[("101", "2025/01/10", "Present"), ("102", "10-01-2025", "Present")],
            ),
        );

        let overview = build_overview(&store, &test_config()).await.unwrap();
        assert_eq!(overview.trend.len(), 1);
        assert_eq!(overview.trend[0].attendance, 1);
    }

    #[tokio::test]
    async fn test_missing_columns_degrade_to_unknown_zero() {
        let store = MemoryStore::new(10);
        store.insert("reports/students.xlsx", roster_workbook(2));
        store.insert("reports/misc.csv", b"Name\nAlice\n".to_vec());

        let overview = build_overview(&store, &test_config()).await.unwrap();
        let row = &overview.subjects[0];
        assert_eq!(row.subject, "Unknown");
        assert_eq!(row.present_count, 0);
        assert!(overview.trend.is_empty());
    }

    #[tokio::test]
    async fn test_no_reports_is_a_validation_failure() {
        let store = MemoryStore::new(10);
        store.insert("reports/students.xlsx", roster_workbook(2));

        let err = build_overview(&store, &test_config()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoReports { .. }));
    }

    #[tokio::test]
    async fn test_empty_roster_uses_denominator_floor_of_one() {
        let store = MemoryStore::new(10);
        store.insert(
            "reports/20250110_2021-25_A_OS.csv",
            session_csv("Operating System", "2021-25", &[("101", "10-01-2025", "Present")]),
        );

        let overview = build_overview(&store, &test_config()).await.unwrap();
        assert_eq!(overview.total_students, 0);
        assert_eq!(overview.subjects[0].total_count, 1);
        assert_eq!(overview.subjects[0].attendance, 100.0);
    }
}
