//! Joins loaded reports against the master roster.

use std::collections::{BTreeMap, HashSet};

use crate::reports::types::{
    AttendanceMark, AttendanceSummary, GroupedReports, SectionAttendance, StudentAttendanceStat,
};
use crate::roster::MasterRoster;

/// Rounds to one decimal place, the display precision for percentages.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Computes per-student presence counts and percentages for every
/// (batch, section) bucket, filling each report's `attendance_map` along the
/// way so every roster student appears in every map, absences included.
///
/// Every report in a bucket counts toward the denominator, including sessions
/// whose presence list is empty. Membership is exact, case-sensitive string
/// equality; names in a report that are not on the roster are ignored. The
/// result is a pure function of the inputs: running this twice over the same
/// snapshot yields identical output.
pub fn calculate_attendance(
    grouped: &mut GroupedReports,
    roster: &MasterRoster,
) -> AttendanceSummary {
    let mut summary = AttendanceSummary::new();

    for (batch, sections) in grouped.iter_mut() {
        for (section, reports) in sections.iter_mut() {
            let students = roster.students_for(batch, section);
            let total_classes = reports.len();

            let mut counts: BTreeMap<String, StudentAttendanceStat> = students
                .iter()
                .map(|student| {
                    (
                        student.clone(),
                        StudentAttendanceStat {
                            present: 0,
                            total: total_classes,
                            percentage: 0.0,
                        },
                    )
                })
                .collect();

            for report in reports.iter_mut() {
                let present: HashSet<&str> =
                    report.students.iter().map(String::as_str).collect();

                report.attendance_map = students
                    .iter()
                    .map(|student| {
                        let mark = if present.contains(student.as_str()) {
                            AttendanceMark::Present
                        } else {
                            AttendanceMark::Absent
                        };
                        (student.clone(), mark)
                    })
                    .collect();

                for (student, mark) in &report.attendance_map {
                    if *mark == AttendanceMark::Present {
                        if let Some(stat) = counts.get_mut(student) {
                            stat.present += 1;
                        }
                    }
                }
            }

            for stat in counts.values_mut() {
                stat.percentage = if stat.total > 0 {
                    round1(stat.present as f64 / stat.total as f64 * 100.0)
                } else {
                    0.0
                };
            }

            summary.insert((batch.clone(), section.clone()), counts);
        }
    }

    summary
}

/// Flattens the tuple-keyed summary into serializable rows.
pub fn summary_rows(summary: &AttendanceSummary) -> Vec<SectionAttendance> {
    summary
        .iter()
        .map(|((batch, section), students)| SectionAttendance {
            batch: batch.clone(),
            section: section.clone(),
            students: students.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::types::Report;
    use chrono::Utc;

    fn report(batch: &str, section: &str, students: &[&str]) -> Report {
        Report {
            id: format!("reports/{batch}_{section}_{}.csv", students.len()),
            file_name: "r.csv".into(),
            user_friendly_name: "r.csv".into(),
            batch: batch.into(),
            section: section.into(),
            subject: "Operating System".into(),
            generated_date: "01 Jan 2025".into(),
            uploaded_at: Utc::now(),
            size: "0.1 KB".into(),
            records: students.len(),
            status: "ready",
            students: students.iter().map(|s| s.to_string()).collect(),
            url: "memory://r.csv".into(),
            attendance_map: Default::default(),
        }
    }

    fn grouped(batch: &str, section: &str, reports: Vec<Report>) -> GroupedReports {
        let mut g = GroupedReports::new();
        g.entry(batch.into()).or_default().insert(section.into(), reports);
        g
    }

    fn roster_2021_25_a() -> MasterRoster {
        let mut roster = MasterRoster::default();
        roster.insert("2021-25", "A", "Alice");
        roster.insert("2021-25", "A", "Bob");
        roster
    }

    #[test]
    fn test_two_report_scenario() {
        let roster = roster_2021_25_a();
        let mut g = grouped(
            "2021-25",
            "A",
            vec![report("2021-25", "A", &["Alice"]), report("2021-25", "A", &[])],
        );

        let summary = calculate_attendance(&mut g, &roster);
        let stats = &summary[&("2021-25".to_string(), "A".to_string())];

        assert_eq!(stats["Alice"].present, 1);
        assert_eq!(stats["Alice"].total, 2);
        assert_eq!(stats["Alice"].percentage, 50.0);
        assert_eq!(stats["Bob"].present, 0);
        assert_eq!(stats["Bob"].percentage, 0.0);

        let reports = &g["2021-25"]["A"];
        assert_eq!(reports[0].attendance_map["Alice"], AttendanceMark::Present);
        assert_eq!(reports[0].attendance_map["Bob"], AttendanceMark::Absent);
        assert_eq!(reports[1].attendance_map["Alice"], AttendanceMark::Absent);
        assert_eq!(reports[1].attendance_map["Bob"], AttendanceMark::Absent);
    }

    #[test]
    fn test_map_keys_equal_roster_despite_off_roster_names() {
        let roster = roster_2021_25_a();
        let mut g = grouped(
            "2021-25",
            "A",
            vec![report("2021-25", "A", &["Alice", "Intruder", "Alice"])],
        );

        let summary = calculate_attendance(&mut g, &roster);
        let map = &g["2021-25"]["A"][0].attendance_map;

        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, [&"Alice".to_string(), &"Bob".to_string()]);

        // Off-roster names never enter the stats either.
        let stats = &summary[&("2021-25".to_string(), "A".to_string())];
        assert!(!stats.contains_key("Intruder"));
    }

    #[test]
    fn test_bucket_without_roster_entry_tracks_nobody() {
        let roster = MasterRoster::default();
        let mut g = grouped("-", "-", vec![report("-", "-", &["Someone"])]);

        let summary = calculate_attendance(&mut g, &roster);
        assert!(summary[&("-".to_string(), "-".to_string())].is_empty());
        assert!(g["-"]["-"][0].attendance_map.is_empty());
    }

    #[test]
    fn test_zero_total_yields_zero_percentage() {
        let roster = roster_2021_25_a();
        let mut g = grouped("2021-25", "A", vec![]);

        let summary = calculate_attendance(&mut g, &roster);
        let stats = &summary[&("2021-25".to_string(), "A".to_string())];
        assert_eq!(stats["Alice"].total, 0);
        assert_eq!(stats["Alice"].percentage, 0.0);
    }

    #[test]
    fn test_idempotent_over_same_snapshot() {
        let roster = roster_2021_25_a();
        let mut g = grouped(
            "2021-25",
            "A",
            vec![report("2021-25", "A", &["Alice"]), report("2021-25", "A", &["Bob"])],
        );

        let first = calculate_attendance(&mut g, &roster);
        let maps_first: Vec<_> = g["2021-25"]["A"]
            .iter()
            .map(|r| r.attendance_map.clone())
            .collect();

        let second = calculate_attendance(&mut g, &roster);
        let maps_second: Vec<_> = g["2021-25"]["A"]
            .iter()
            .map(|r| r.attendance_map.clone())
            .collect();

        assert_eq!(first, second);
        assert_eq!(maps_first, maps_second);
    }

    #[test]
    fn test_percentage_rounds_to_one_decimal() {
        let roster = roster_2021_25_a();
        let mut g = grouped(
            "2021-25",
            "A",
            vec![
                report("2021-25", "A", &["Alice"]),
                report("2021-25", "A", &["Alice"]),
                report("2021-25", "A", &[]),
            ],
        );

        let summary = calculate_attendance(&mut g, &roster);
        let stats = &summary[&("2021-25".to_string(), "A".to_string())];
        assert_eq!(stats["Alice"].percentage, 66.7);
    }
}
