//! Report ingestion and attendance aggregation.
//!
//! Loading groups raw report files by batch and section; aggregation joins
//! them against the master roster to produce per-student percentages and a
//! per-session presence map on every report.

pub mod aggregate;
pub mod loader;
pub mod types;
