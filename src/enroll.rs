//! Student enrollment: validate and store reference photos, index them into
//! the face collection, and rebuild the student registry workbook.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::marking::student_from_key;
use crate::recognition::FaceService;
use crate::sheet;
use crate::store::{self, ObjectStore};

const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const REGISTRY_SHEET: &str = "All Students";
const REGISTRY_HEADER: [&str; 4] = [
    "Batch Name",
    "ER Number",
    "Student Name",
    "Upload Date & Time",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_name: String,
    pub stored_key: Option<String>,
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Keeps letters, digits, `_` and `-`; spaces become underscores, everything
/// else is dropped.
pub fn sanitize_key_part(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else if c == ' ' {
                Some('_')
            } else {
                None
            }
        })
        .collect()
}

fn photo_extension(file_name: &str) -> Option<String> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    PHOTO_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn validate_photo(file_name: &str, bytes: &[u8]) -> Result<String, PipelineError> {
    let ext = photo_extension(file_name).ok_or_else(|| PipelineError::InvalidPhoto {
        file_name: file_name.to_string(),
        reason: "only jpg, jpeg and png files are accepted".to_string(),
    })?;
    if bytes.is_empty() {
        return Err(PipelineError::InvalidPhoto {
            file_name: file_name.to_string(),
            reason: "file is empty".to_string(),
        });
    }
    if bytes.len() > MAX_PHOTO_BYTES {
        return Err(PipelineError::InvalidPhoto {
            file_name: file_name.to_string(),
            reason: "file exceeds the 5 MB limit".to_string(),
        });
    }
    Ok(ext)
}

/// Enrolls one student: each photo is validated, stored under
/// `<batch>/<er>_<name>_<n>.<ext>`, and indexed into the face collection.
/// Failures are reported per photo rather than aborting the whole upload;
/// the registry workbook is rebuilt afterwards if anything was stored.
pub async fn enroll_student(
    store: &dyn ObjectStore,
    faces: &dyn FaceService,
    cfg: &AppConfig,
    batch: &str,
    er_number: &str,
    name: &str,
    photos: &[(String, Vec<u8>)],
) -> Result<Vec<UploadResult>, PipelineError> {
    let batch_part = sanitize_key_part(batch);
    let er_part = sanitize_key_part(er_number);
    let name_part = sanitize_key_part(name);
    let external_id = format!("{er_part}_{name_part}");

    let mut results = Vec::with_capacity(photos.len());
    let mut stored_any = false;

    for (n, (file_name, bytes)) in photos.iter().enumerate() {
        let ext = match validate_photo(file_name, bytes) {
            Ok(ext) => ext,
            Err(e) => {
                results.push(UploadResult {
                    file_name: file_name.clone(),
                    stored_key: None,
                    indexed: false,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let key = format!("{batch_part}/{er_part}_{name_part}_{}.{ext}", n + 1);
        if let Err(e) = store.put(&key, bytes.clone(), photo_content_type(&ext)).await {
            warn!(key, error = %e, "Photo upload failed");
            results.push(UploadResult {
                file_name: file_name.clone(),
                stored_key: None,
                indexed: false,
                error: Some(e.to_string()),
            });
            continue;
        }
        stored_any = true;

        let (indexed, error) = match faces.index_face(&key, &external_id).await {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("no face found in the photo".to_string())),
            Err(e) => {
                warn!(key, error = %e, "Face indexing failed");
                (false, Some(e.to_string()))
            }
        };
        results.push(UploadResult {
            file_name: file_name.clone(),
            stored_key: Some(key),
            indexed,
            error,
        });
    }

    if stored_any {
        sync_student_registry(store, cfg)
            .await
            .map_err(PipelineError::Internal)?;
        info!(batch, er_number, "Student enrolled");
    }

    Ok(results)
}

fn photo_content_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

/// Rebuilds the registry workbook from the stored photos: one combined
/// "All Students" sheet plus a sheet per batch. Report objects and workbooks
/// themselves are excluded from the scan.
pub async fn sync_student_registry(store: &dyn ObjectStore, cfg: &AppConfig) -> Result<()> {
    let objects = store::list_all(store, "").await?;

    // (batch, er, name) -> upload time, deduplicated across multiple photos.
    let mut students: BTreeMap<(String, String, String), String> = BTreeMap::new();
    for obj in objects {
        if obj.key.starts_with(&cfg.reports_prefix) || photo_extension(&obj.key).is_none() {
            continue;
        }
        let Some((batch, _)) = obj.key.split_once('/') else {
            continue;
        };
        let student = student_from_key(&obj.key);
        let uploaded = obj.last_modified.format("%d-%m-%Y %H:%M:%S").to_string();
        students
            .entry((batch.to_string(), student.er_number, student.name))
            .or_insert(uploaded);
    }

    let mut all_rows: Vec<Vec<String>> =
        vec![REGISTRY_HEADER.iter().map(|h| h.to_string()).collect()];
    let mut per_batch: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();

    for ((batch, er, name), uploaded) in &students {
        all_rows.push(vec![
            batch.clone(),
            er.clone(),
            name.clone(),
            uploaded.clone(),
        ]);
        per_batch
            .entry(batch.clone())
            .or_insert_with(|| {
                vec![vec![
                    "ER Number".to_string(),
                    "Student Name".to_string(),
                    "Upload Date & Time".to_string(),
                ]]
            })
            .push(vec![er.clone(), name.clone(), uploaded.clone()]);
    }

    let mut sheets = vec![(REGISTRY_SHEET.to_string(), all_rows)];
    sheets.extend(per_batch);

    let workbook = sheet::write_workbook(&sheets)?;
    store
        .put(&cfg.registry_key, workbook, sheet::XLSX_CONTENT_TYPE)
        .await
        .context("registry upload failed")?;

    info!(students = students.len(), key = %cfg.registry_key, "Registry rebuilt");
    Ok(())
}
