//! Error taxonomy for the attendance pipeline.
//!
//! Degraded inputs are not errors: an unparseable filename falls back to
//! sentinel metadata, a broken roster to the empty roster, a missing sheet
//! column to an empty list. Only store-level failures, absent-where-required
//! inputs and unexpected internals surface as [`PipelineError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Listing or downloading from the object store failed.
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// No report files exist where at least one is required.
    #[error("no report files found under `{prefix}`")]
    NoReports { prefix: String },

    /// The combined session sheets are missing columns the dashboard needs.
    #[error("missing required columns: {columns:?}")]
    MissingColumns { columns: Vec<String> },

    /// A group photo contained no detectable face.
    #[error("no face detected in group image")]
    NoFaceInGroupImage,

    /// An uploaded student photo was rejected before reaching the store.
    #[error("invalid photo `{file_name}`: {reason}")]
    InvalidPhoto { file_name: String, reason: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
