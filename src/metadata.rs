//! Filename-based report classification.
//!
//! Report files follow `<YYYYMMDD>_<batch>_<section>_<subjectCode>.<ext>`.
//! Anything else degrades to sentinel metadata instead of failing; a report
//! is never dropped for having an unparseable name.

use chrono::NaiveDate;

/// Sentinel for every classification field that could not be parsed.
pub const UNPARSED: &str = "-";

/// Subject code lookup. Unknown codes pass through unchanged.
static SUBJECT_MAP: &[(&str, &str)] = &[
    ("OS", "Operating System"),
    ("CN", "Computer Networks"),
    ("DBMS", "Database Management Systems"),
    ("AI", "Artificial Intelligence"),
];

/// Classification fields extracted from a report filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMetadata {
    pub batch: String,
    pub section: String,
    pub subject: String,
    /// Session date in `DD Mon YYYY` display form.
    pub date: String,
    /// Human-readable label; falls back to the raw filename when degraded.
    pub label: String,
}

impl ReportMetadata {
    fn sentinel(file_name: &str) -> Self {
        Self {
            batch: UNPARSED.to_string(),
            section: UNPARSED.to_string(),
            subject: UNPARSED.to_string(),
            date: UNPARSED.to_string(),
            label: file_name.to_string(),
        }
    }
}

/// Expands a subject code to its full name, or echoes the code back.
pub fn resolve_subject(code: &str) -> &str {
    SUBJECT_MAP
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, full)| *full)
        .unwrap_or(code)
}

/// Parses `(batch, section, subject, date, label)` out of a report filename.
///
/// Tokens come from splitting the extension-stripped name on `_`; the first
/// token must be an 8-digit `YYYYMMDD` date and at least four tokens must be
/// present. This function never fails; any shortfall yields the sentinel
/// tuple with the raw filename as label.
pub fn parse_report_filename(file_name: &str) -> ReportMetadata {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file_name,
    };

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 4 {
        return ReportMetadata::sentinel(file_name);
    }

    let Ok(date) = NaiveDate::parse_from_str(parts[0], "%Y%m%d") else {
        return ReportMetadata::sentinel(file_name);
    };

    let date = date.format("%d %b %Y").to_string();
    let batch = parts[1].to_string();
    let section = parts[2].to_string();
    let subject = resolve_subject(parts[3]).to_string();
    let label = format!("{subject} | Batch {batch} | Section {section} | {date}");

    ReportMetadata {
        batch,
        section,
        subject,
        date,
        label,
    }
}
