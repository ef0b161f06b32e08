//! Data model for loaded attendance reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-session presence mark attached to a report after aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceMark {
    Present,
    Absent,
}

/// One attendance session's record, loaded from a single report file.
///
/// All fields are rebuilt from the store on every request; nothing here is
/// persisted back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Storage key; unique per report.
    pub id: String,
    pub file_name: String,
    pub user_friendly_name: String,
    pub batch: String,
    pub section: String,
    pub subject: String,
    pub generated_date: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: String,
    /// Row count of the underlying sheet.
    pub records: usize,
    pub status: &'static str,
    /// Names marked present, in source row order; raw and possibly
    /// duplicated, and may contain names absent from the roster.
    pub students: Vec<String>,
    pub url: String,
    /// Roster name -> mark. Empty until aggregation runs; afterwards its key
    /// set equals the roster list for this report's (batch, section).
    pub attendance_map: BTreeMap<String, AttendanceMark>,
}

/// Reports grouped `batch -> section -> [Report]`. Reports with unparseable
/// names land under the `"-"` bucket rather than being dropped.
pub type GroupedReports = BTreeMap<String, BTreeMap<String, Vec<Report>>>;

/// Per-student presence counts for one (batch, section).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StudentAttendanceStat {
    pub present: usize,
    /// Report count for the bucket; every report counts, empty sessions
    /// included.
    pub total: usize,
    pub percentage: f64,
}

/// Aggregation result keyed by (batch, section).
pub type AttendanceSummary = BTreeMap<(String, String), BTreeMap<String, StudentAttendanceStat>>;

/// Serializable flattening of one summary bucket.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAttendance {
    pub batch: String,
    pub section: String,
    pub students: BTreeMap<String, StudentAttendanceStat>,
}
