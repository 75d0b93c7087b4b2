use anyhow::Context;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::core::config::Settings;
use crate::services::collaborators::{ImageSource, RenderRequest, ReportRenderer};

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

/// Stored object summary returned by uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredObject {
    pub(crate) key: String,
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

pub(crate) fn exam_image_key(exam_id: &str, extension: &str) -> String {
    format!("exams/{exam_id}/original.{extension}")
}

pub(crate) fn report_key(exam_id: &str) -> String {
    format!("reports/{exam_id}/report.json")
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if settings.s3().access_key.is_empty() || settings.s3().secret_key.is_empty() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "exam-assessment-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds);
        if !settings.s3().endpoint.is_empty() {
            loader = loader.endpoint_url(settings.s3().endpoint.clone());
        }
        let config = loader.load().await;

        let client = Client::new(&config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }

    pub(crate) async fn presign_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    pub(crate) async fn upload_bytes(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<StoredObject> {
        let size = bytes.len() as i64;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("Failed to upload {key}"))?;

        Ok(StoredObject { key: key.to_string(), size, sha256 })
    }

    pub(crate) async fn download_bytes(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {key}"))?;
        let body = object.body.collect().await.with_context(|| format!("Failed to read {key}"))?;
        Ok(body.into_bytes().to_vec())
    }
}

#[async_trait]
impl ImageSource for StorageService {
    async fn fetch_image(&self, image_key: &str) -> anyhow::Result<Vec<u8>> {
        self.download_bytes(image_key).await
    }
}

/// Persists the report bundle as JSON; layout and PDF rendering happen downstream.
#[derive(Debug, Clone)]
pub(crate) struct StorageReportRenderer {
    storage: StorageService,
}

impl StorageReportRenderer {
    pub(crate) fn new(storage: StorageService) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ReportRenderer for StorageReportRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> anyhow::Result<Vec<String>> {
        let document = json!({
            "exam_id": request.exam_id,
            "exam_meta": request.meta,
            "overall_stats": request.stats,
            "diagnostic_report": request.report,
        });
        let bytes = serde_json::to_vec_pretty(&document)?;
        let stored = self
            .storage
            .upload_bytes(&report_key(request.exam_id), "application/json", bytes)
            .await?;
        tracing::info!(
            exam_id = request.exam_id,
            key = %stored.key,
            size = stored.size,
            sha256 = %stored.sha256,
            "report artifact stored"
        );
        Ok(vec![stored.key])
    }
}
