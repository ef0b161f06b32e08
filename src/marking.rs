//! Session marking: match classroom group photos against a batch's stored
//! student photos and persist the session report back to the store.

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::recognition::FaceService;
use crate::sheet;
use crate::store::{self, ObjectStore};

/// Similarity floor for a face match, in percent.
const MATCH_THRESHOLD: f32 = 80.0;

const REPORT_HEADER: [&str; 8] = [
    "ER Number",
    "Student Name",
    "Date",
    "Time",
    "Class",
    "Subject",
    "Batch",
    "Status",
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionStudent {
    pub er_number: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub present: Vec<SessionStudent>,
    pub absent: Vec<SessionStudent>,
    pub report_url: String,
}

fn is_photo(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg") || lower.ends_with(".png")
}

/// `(er_number, name)` from a photo key stem shaped `<er>_<name parts...>`;
/// a stem without an underscore yields the stem for both fields.
pub fn student_from_key(key: &str) -> SessionStudent {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    match stem.split_once('_') {
        Some((er, rest)) => SessionStudent {
            er_number: er.trim().to_string(),
            name: rest.split('_').collect::<Vec<_>>().join(" ").trim().to_string(),
        },
        None => SessionStudent {
            er_number: stem.trim().to_string(),
            name: stem.trim().to_string(),
        },
    }
}

/// Marks one session: every stored photo under `<batch>/` is compared against
/// every group photo; a match at or above the threshold marks that student
/// present. The rest of the batch is absent. A per-student comparison failure
/// is logged and skipped; a group photo without any detectable face aborts
/// the session.
pub async fn mark_batch_attendance(
    store: &dyn ObjectStore,
    faces: &dyn FaceService,
    cfg: &AppConfig,
    batch: &str,
    section: &str,
    subject: &str,
    group_images: &[Vec<u8>],
) -> Result<SessionOutcome, PipelineError> {
    let prefix = format!("{batch}/");
    let photo_keys: Vec<String> = store::list_all(store, &prefix)
        .await
        .map_err(PipelineError::StoreUnavailable)?
        .into_iter()
        .filter(|obj| is_photo(&obj.key) && obj.key != prefix)
        .map(|obj| obj.key)
        .collect();

    let mut matched: BTreeMap<String, SessionStudent> = BTreeMap::new();

    for group_image in group_images {
        let face_count = faces
            .detect_face_count(group_image)
            .await
            .map_err(PipelineError::Internal)?;
        if face_count == 0 {
            return Err(PipelineError::NoFaceInGroupImage);
        }

        for key in &photo_keys {
            let reference = match store.get(key).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(key, error = %e, "Could not fetch student photo");
                    continue;
                }
            };

            match faces.match_faces(&reference, group_image, MATCH_THRESHOLD).await {
                Ok(true) => {
                    let student = student_from_key(key);
                    matched.insert(student.er_number.clone(), student);
                }
                Ok(false) => {}
                Err(e) => warn!(key, error = %e, "Face comparison failed"),
            }
        }
    }

    // Batch membership comes from the photo listing itself.
    let mut batch_students: Vec<SessionStudent> =
        photo_keys.iter().map(|key| student_from_key(key)).collect();
    batch_students.sort();
    batch_students.dedup_by(|a, b| a.er_number == b.er_number);

    let absent: Vec<SessionStudent> = batch_students
        .iter()
        .filter(|student| !matched.contains_key(&student.er_number))
        .cloned()
        .collect();
    let present: Vec<SessionStudent> = matched.into_values().collect();

    let report_url = write_session_report(store, cfg, batch, section, subject, &present, &absent)
        .await
        .map_err(PipelineError::Internal)?;

    info!(
        batch,
        present = present.len(),
        absent = absent.len(),
        "Session marked"
    );

    Ok(SessionOutcome {
        present,
        absent,
        report_url,
    })
}

/// Writes the session worksheet and uploads it under the reports prefix,
/// named to the `<date>_<batch>_<section>_<subject>` convention (plus a time
/// token so repeated sessions on one day stay distinct).
async fn write_session_report(
    store: &dyn ObjectStore,
    cfg: &AppConfig,
    batch: &str,
    section: &str,
    subject: &str,
    present: &[SessionStudent],
    absent: &[SessionStudent],
) -> Result<String> {
    let now = Local::now();
    let date = now.format("%d-%m-%Y").to_string();
    let time = now.format("%H:%M:%S").to_string();

    let mut rows: Vec<Vec<String>> =
        vec![REPORT_HEADER.iter().map(|h| h.to_string()).collect()];
    for (students, status) in [(present, "Present"), (absent, "Absent")] {
        for student in students {
            rows.push(vec![
                student.er_number.clone(),
                student.name.clone(),
                date.clone(),
                time.clone(),
                section.to_string(),
                subject.to_string(),
                batch.to_string(),
                status.to_string(),
            ]);
        }
    }

    let file_name = format!(
        "{}_{}_{}_{}_{}.xlsx",
        now.format("%Y%m%d"),
        key_safe(batch),
        key_safe(section),
        key_safe(subject),
        now.format("%H%M%S"),
    );
    let key = format!("{}{}", cfg.reports_prefix, file_name);

    let workbook = sheet::write_workbook(&[("Attendance".to_string(), rows)])?;
    store.put(&key, workbook, sheet::XLSX_CONTENT_TYPE).await?;

    Ok(store.public_url(&key))
}

fn key_safe(value: &str) -> String {
    value.trim().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// Matches when the reference bytes appear inside the target bytes;
    /// "faces" are just byte tags in these tests.
    struct SubstringFaces;

    #[async_trait]
    impl FaceService for SubstringFaces {
        async fn detect_face_count(&self, image: &[u8]) -> Result<usize> {
            Ok(usize::from(!image.is_empty()))
        }

        async fn match_faces(
            &self,
            reference: &[u8],
            target: &[u8],
            _similarity_threshold: f32,
        ) -> Result<bool> {
            Ok(!reference.is_empty()
                && target
                    .windows(reference.len())
                    .any(|window| window == reference))
        }

        async fn index_face(&self, _stored_key: &str, _external_id: &str) -> Result<bool> {
            Ok(true)
        }
    }

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

    #[test]
    fn test_student_from_key_joins_name_parts() {
        let student = student_from_key("2021-25/101_Alice_Smith_1.jpg");
        assert_eq!(student.er_number, "101");
        assert_eq!(student.name, "Alice Smith 1");
    }

    #[test]
    fn test_student_from_key_without_underscore_falls_back() {
        let student = student_from_key("2021-25/justalice.jpg");
        assert_eq!(student.er_number, "justalice");
        assert_eq!(student.name, "justalice");
    }

    #[tokio::test]
    async fn test_session_splits_present_and_absent() {
        let store = MemoryStore::new(10);
        store.insert("2021-25/101_Alice_1.jpg", b"face-alice".to_vec());
        store.insert("2021-25/102_Bob_1.jpg", b"face-bob".to_vec());
        store.insert("2021-25/notes.txt", b"skip me".to_vec());

        let group = vec![b"classroom face-alice classroom".to_vec()];
        let outcome = mark_batch_attendance(
            &store,
            &SubstringFaces,
            &test_config(),
            "2021-25",
            "A",
            "OS",
            &group,
        )
        .await
        .unwrap();

        assert_eq!(outcome.present.len(), 1);
        assert_eq!(outcome.present[0].er_number, "101");
        assert_eq!(outcome.absent.len(), 1);
        assert_eq!(outcome.absent[0].er_number, "102");

        // The report landed under the reports prefix with a parseable name.
        let report_key = store
            .keys()
            .into_iter()
            .find(|k| k.starts_with("reports/") && k.ends_with(".xlsx"))
            .expect("report uploaded");
        let meta = crate::metadata::parse_report_filename(
            report_key.rsplit('/').next().unwrap(),
        );
        assert_eq!(meta.batch, "2021-25");
        assert_eq!(meta.section, "A");
        assert_eq!(meta.subject, "Operating System");
        assert!(outcome.report_url.contains("reports/"));
    }

    #[tokio::test]
    async fn test_group_photo_without_face_aborts() {
        let store = MemoryStore::new(10);
        store.insert("2021-25/101_Alice_1.jpg", b"face-alice".to_vec());

        let group = vec![Vec::new()];
        let err = mark_batch_attendance(
            &store,
            &SubstringFaces,
            &test_config(),
            "2021-25",
            "A",
            "OS",
            &group,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::NoFaceInGroupImage));
    }

    #[tokio::test]
    async fn test_multiple_photos_per_student_dedup() {
        let store = MemoryStore::new(10);
        store.insert("2021-25/101_Alice_1.jpg", b"face-alice".to_vec());
        store.insert("2021-25/101_Alice_2.jpg", b"face-alice-side".to_vec());

        let group = vec![b"face-alice".to_vec()];
        let outcome = mark_batch_attendance(
            &store,
            &SubstringFaces,
            &test_config(),
            "2021-25",
            "A",
            "OS",
            &group,
        )
        .await
        .unwrap();

        assert_eq!(outcome.present.len(), 1);
        assert!(outcome.absent.is_empty());
    }
}
