//! Face recognition seam.
//!
//! Session marking and enrollment talk to the managed face service through
//! this trait so the matching flow is testable without network calls.

pub mod rekognition;

use anyhow::Result;
use async_trait::async_trait;

pub use rekognition::RekognitionService;

#[async_trait]
pub trait FaceService: Send + Sync {
    /// Number of faces detected in an image.
    async fn detect_face_count(&self, image: &[u8]) -> Result<usize>;

    /// Whether the reference face appears in the target image at or above
    /// `similarity_threshold` (0-100).
    async fn match_faces(
        &self,
        reference: &[u8],
        target: &[u8],
        similarity_threshold: f32,
    ) -> Result<bool>;

    /// Indexes an already-stored photo into the face collection under an
    /// external identifier. Returns `false` when the photo contained no face.
    async fn index_face(&self, stored_key: &str, external_id: &str) -> Result<bool>;
}
