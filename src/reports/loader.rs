//! Report ingestion from the object store.

use tracing::warn;

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::metadata::parse_report_filename;
use crate::reports::types::{GroupedReports, Report};
use crate::sheet;
use crate::store::{self, ObjectInfo, ObjectStore};

/// Lists and parses every report under the configured prefix, grouping the
/// results `batch -> section -> [Report]`.
///
/// The listing is drained page by page before any grouping happens. The
/// master roster object is skipped, as is anything that is neither CSV nor
/// XLSX; everything else is ingested even when its name or content is
/// degraded. Store failures map to [`PipelineError::StoreUnavailable`];
/// callers must treat that as terminal for the request.
pub async fn load_reports(
    store: &dyn ObjectStore,
    cfg: &AppConfig,
) -> Result<GroupedReports, PipelineError> {
    let objects = store::list_all(store, &cfg.reports_prefix)
        .await
        .map_err(PipelineError::StoreUnavailable)?;

    let mut grouped = GroupedReports::new();

    for obj in objects {
        if obj.file_name().eq_ignore_ascii_case(cfg.roster_file_name()) {
            continue;
        }
        if !sheet::is_report_file(&obj.key) {
            continue;
        }

        let bytes = store
            .get(&obj.key)
            .await
            .map_err(PipelineError::StoreUnavailable)?;
        let report = build_report(store, &obj, &bytes);

        grouped
            .entry(report.batch.clone())
            .or_default()
            .entry(report.section.clone())
            .or_default()
            .push(report);
    }

    Ok(grouped)
}

fn build_report(store: &dyn ObjectStore, obj: &ObjectInfo, bytes: &[u8]) -> Report {
    let file_name = obj.file_name().to_string();
    let (records, students) = extract_students(&obj.key, bytes);
    let meta = parse_report_filename(&file_name);

    Report {
        id: obj.key.clone(),
        file_name,
        user_friendly_name: meta.label,
        batch: meta.batch,
        section: meta.section,
        subject: meta.subject,
        generated_date: meta.date,
        uploaded_at: obj.last_modified,
        size: format!("{:.1} KB", obj.size as f64 / 1024.0),
        records,
        status: "ready",
        students,
        url: store.public_url(&obj.key),
        attendance_map: Default::default(),
    }
}

/// Row count and present-student names for one report file.
///
/// CSV: the first row is the header and every later row's first cell is a
/// name; empty rows are dropped silently. XLSX: the `Name` column when
/// present, otherwise no students. Unreadable content degrades to an empty
/// report; the file still appears in the grouping with zero records.
fn extract_students(key: &str, bytes: &[u8]) -> (usize, Vec<String>) {
    let table = match sheet::parse_table(key, bytes) {
        Ok(table) => table,
        Err(e) => {
            warn!(key, error = %e, "Unreadable report file");
            return (0, Vec::new());
        }
    };

    let students = if key.to_ascii_lowercase().ends_with(".csv") {
        table
            .rows
            .iter()
            .filter_map(|row| row.first())
            .filter(|name| !name.is_empty())
            .cloned()
            .collect()
    } else {
        table.column("Name")
    };

    (table.rows.len(), students)
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

    fn csv_report(names: &[&str]) -> Vec<u8> {
        let mut body = String::from("Name\n");
        for name in names {
            body.push_str(name);
            body.push('\n');
        }
        body.into_bytes()
    }

    #[tokio::test]
    async fn test_collects_across_continuation_pages() {
        // Three pages of two objects each; all six must be ingested.
        let store = MemoryStore::new(2);
        for i in 0..6 {
            store.insert(
                &format!("reports/20250101_2021-25_A_OS_{i}.csv"),
                csv_report(&["Alice"]),
            );
        }

        let grouped = load_reports(&store, &test_config()).await.unwrap();
        assert_eq!(grouped["2021-25"]["A"].len(), 6);
    }

    #[tokio::test]
    async fn test_skips_roster_and_foreign_extensions() {
        let store = MemoryStore::new(10);
        store.insert("reports/students.xlsx", b"not-a-report".to_vec());
        store.insert("reports/readme.txt", b"hello".to_vec());
        store.insert(
            "reports/20250101_2021-25_A_OS.csv",
            csv_report(&["Alice", "Bob"]),
        );

        let grouped = load_reports(&store, &test_config()).await.unwrap();
        let total: usize = grouped
            .values()
            .flat_map(|s| s.values())
            .map(Vec::len)
            .sum();
        assert_eq!(total, 1);
        assert_eq!(grouped["2021-25"]["A"][0].students, ["Alice", "Bob"]);
        assert_eq!(grouped["2021-25"]["A"][0].records, 2);
    }

    #[tokio::test]
    async fn test_unparseable_name_lands_in_sentinel_bucket() {
        let store = MemoryStore::new(10);
        store.insert("reports/oddly-named.csv", csv_report(&["Alice"]));

        let grouped = load_reports(&store, &test_config()).await.unwrap();
        let report = &grouped["-"]["-"][0];
        assert_eq!(report.user_friendly_name, "oddly-named.csv");
        assert_eq!(report.students, ["Alice"]);
    }

    #[tokio::test]
    async fn test_xlsx_without_name_column_yields_no_students() {
        let store = MemoryStore::new(10);
        let rows = vec![
            vec!["Batch".to_string()],
            vec!["2021-25".to_string()],
        ];
        store.insert(
            "reports/20250101_2021-25_A_OS.xlsx",
            write_workbook(&[("Attendance".to_string(), rows)]).unwrap(),
        );

        let grouped = load_reports(&store, &test_config()).await.unwrap();
        let report = &grouped["2021-25"]["A"][0];
        assert!(report.students.is_empty());
        assert_eq!(report.records, 1);
    }

    #[tokio::test]
    async fn test_corrupt_xlsx_degrades_to_empty_report() {
        let store = MemoryStore::new(10);
        store.insert(
            "reports/20250101_2021-25_A_OS.xlsx",
            vec![0xDE, 0xAD, 0xBE, 0xEF],
        );

        let grouped = load_reports(&store, &test_config()).await.unwrap();
        let report = &grouped["2021-25"]["A"][0];
        assert_eq!(report.records, 0);
        assert!(report.students.is_empty());
    }
}
