//! AWS Rekognition-backed face service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::error::SdkError;
use aws_sdk_rekognition::operation::create_collection::CreateCollectionError;
use aws_sdk_rekognition::operation::index_faces::IndexFacesError;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, Image, S3Object};
use tracing::info;

use super::FaceService;
use crate::config::AppConfig;

pub struct RekognitionService {
    client: aws_sdk_rekognition::Client,
    bucket: String,
    collection_id: String,
}

impl RekognitionService {
    pub async fn from_config(cfg: &AppConfig) -> Self {
        let aws_cfg = aws_config::load_from_env().await;
        Self {
            client: aws_sdk_rekognition::Client::new(&aws_cfg),
            bucket: cfg.bucket.clone(),
            collection_id: cfg.collection_id.clone(),
        }
    }

    fn bytes_image(bytes: &[u8]) -> Image {
        Image::builder().bytes(Blob::new(bytes)).build()
    }

    fn stored_image(&self, key: &str) -> Image {
        Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&self.bucket)
                    .name(key)
                    .build(),
            )
            .build()
    }

    async fn try_index(
        &self,
        stored_key: &str,
        external_id: &str,
    ) -> std::result::Result<bool, SdkError<IndexFacesError>> {
        let response = self
            .client
            .index_faces()
            .collection_id(&self.collection_id)
            .image(self.stored_image(stored_key))
            .external_image_id(external_id)
            .detection_attributes(Attribute::Default)
            .send()
            .await?;
        Ok(!response.face_records().is_empty())
    }

    /// Idempotent create: an already-existing collection is not an error.
    async fn ensure_collection(&self) -> Result<()> {
        match self
            .client
            .create_collection()
            .collection_id(&self.collection_id)
            .send()
            .await
        {
            Ok(_) => {
                info!(collection = %self.collection_id, "Created face collection");
                Ok(())
            }
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(CreateCollectionError::ResourceAlreadyExistsException(_))
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e).context("create_collection failed"),
        }
    }
}

#[async_trait]
impl FaceService for RekognitionService {
    async fn detect_face_count(&self, image: &[u8]) -> Result<usize> {
        let response = self
            .client
            .detect_faces()
            .image(Self::bytes_image(image))
            .attributes(Attribute::Default)
            .send()
            .await
            .context("detect_faces failed")?;
        Ok(response.face_details().len())
    }

    async fn match_faces(
        &self,
        reference: &[u8],
        target: &[u8],
        similarity_threshold: f32,
    ) -> Result<bool> {
        let response = self
            .client
            .compare_faces()
            .source_image(Self::bytes_image(reference))
            .target_image(Self::bytes_image(target))
            .similarity_threshold(similarity_threshold)
            .send()
            .await
            .context("compare_faces failed")?;
        Ok(!response.face_matches().is_empty())
    }

    /// Ensure-resource-then-retry-exactly-once: a missing collection is
    /// created idempotently and the index call repeated one time, never
    /// recursively.
    async fn index_face(&self, stored_key: &str, external_id: &str) -> Result<bool> {
        match self.try_index(stored_key, external_id).await {
            Ok(indexed) => Ok(indexed),
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(IndexFacesError::ResourceNotFoundException(_))
                ) =>
            {
                self.ensure_collection().await?;
                self.try_index(stored_key, external_id)
                    .await
                    .context("index_faces retry failed")
            }
            Err(e) => Err(e).context("index_faces failed"),
        }
    }
}
