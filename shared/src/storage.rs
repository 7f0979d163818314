use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("presign failed: {0}")]
    Presign(String),
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub method: &'static str,
    pub content_type: String,
    /// Durable reference to pass as `file_url` on submit once the PUT succeeds
    pub file_url: String,
    pub expires_in: u64,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key` and return its retrieval URL
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError>;

    /// Whether `url` names an object uploaded for `student_email`
    fn is_submission_reference(&self, student_email: &str, url: &str) -> bool;
}

/// Object key for a student's uploaded thesis document:
/// `submissions/{email}/{uuid}.{ext}`
pub fn submission_key(student_email: &str, file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());

    format!(
        "submissions/{}/{}.{}",
        student_email,
        uuid::Uuid::new_v4(),
        extension
    )
}

/// True when `url` is `{base_url}/submissions/{email}/{name}` with a single
/// plain file name, as produced by [`submission_key`]
pub fn references_submission(base_url: &str, student_email: &str, url: &str) -> bool {
    let prefix = format!("{}/submissions/{}/", base_url, student_email);
    match url.strip_prefix(&prefix) {
        Some(name) => {
            !name.is_empty()
                && !name.starts_with('.')
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        }
        None => false,
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn base_url(&self) -> String {
        format!("https://{}.s3.amazonaws.com", self.bucket)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url(), key)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("S3 put_object failed for {}: {:?}", key, e);
                StorageError::Upload(format!("Failed to upload to S3: {}", e))
            })?;

        tracing::info!("Uploaded {} bytes to s3://{}/{}", size, self.bucket, key);
        Ok(self.public_url(key))
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Presign(format!("Invalid presign expiry: {}", e)))?;

        let presigned_request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(format!("Failed to generate presigned URL: {}", e)))?;

        Ok(PresignedUpload {
            upload_url: presigned_request.uri().to_string(),
            method: "PUT",
            content_type: content_type.to_string(),
            file_url: self.public_url(key),
            expires_in: expires_in.as_secs(),
        })
    }

    fn is_submission_reference(&self, student_email: &str, url: &str) -> bool {
        references_submission(&self.base_url(), student_email, url)
    }
}
