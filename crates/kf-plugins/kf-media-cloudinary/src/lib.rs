//! # kf-media-cloudinary
//!
//! `MediaHost` over the Cloudinary unsigned-upload HTTP API.
//! One multipart POST per file; the pipeline (`image`, `video`, `raw`) is
//! picked from the MIME type. Uploads request a delete token so a failed
//! batch can be rolled back with `delete_by_token`.

use std::time::Duration;

use async_trait::async_trait;
use kf_config::MediaConfig;
use kf_core::policy::resource_kind_for;
use kf_core::{MediaHost, ResourceKind, UploadError, UploadFile, UploadedMedia};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, error, warn};

const FALLBACK_MESSAGE: &str = "Upload failed.";

pub struct CloudinaryMediaHost {
    client: reqwest::Client,
    config: MediaConfig,
}

/// Success body of `/{kind}/upload`.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: Option<String>,
    resource_type: Option<String>,
    format: Option<String>,
    bytes: Option<u64>,
    original_filename: Option<String>,
    delete_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CloudinaryMediaHost {
    pub fn new(config: MediaConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UploadError::new(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn base(&self) -> String {
        format!(
            "{}/v1_1/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    pub fn upload_endpoint(&self, kind: ResourceKind) -> String {
        format!("{}/{}/upload", self.base(), kind.as_str())
    }

    pub fn delete_endpoint(&self) -> String {
        format!("{}/delete_by_token", self.base())
    }
}

/// The host's JSON `error.message`, else the raw body, else a default sentence.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if !parsed.error.message.trim().is_empty() {
            return parsed.error.message;
        }
    }
    match body.trim() {
        "" => FALLBACK_MESSAGE.to_string(),
        raw => raw.to_string(),
    }
}

fn parse_kind(raw: Option<&str>, routed: ResourceKind) -> ResourceKind {
    match raw {
        Some("image") => ResourceKind::Image,
        Some("video") => ResourceKind::Video,
        Some("raw") => ResourceKind::Raw,
        _ => routed,
    }
}

#[async_trait]
impl MediaHost for CloudinaryMediaHost {
    async fn upload(&self, file: &UploadFile) -> Result<UploadedMedia, UploadError> {
        let kind = resource_kind_for(&file.mime);
        let endpoint = self.upload_endpoint(kind);
        let fail = |message: String| UploadError::new(message).for_file(file.name.clone());

        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(file.mime.as_ref())
            .map_err(|e| fail(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone())
            .text("return_delete_token", "true");

        debug!(file = %file.name, size = file.size(), kind = kind.as_str(), "uploading");
        let res = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(file = %file.name, error = %e, "media host unreachable");
                fail(e.to_string())
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| fail(e.to_string()))?;
        if !status.is_success() {
            let message = extract_error_message(&body);
            error!(file = %file.name, %status, %message, "media host rejected upload");
            return Err(fail(message));
        }

        let data: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| fail(format!("unexpected media host response: {e}")))?;
        Ok(UploadedMedia {
            url: data.secure_url,
            public_id: data.public_id,
            resource_kind: parse_kind(data.resource_type.as_deref(), kind),
            format: data.format,
            bytes: data.bytes.unwrap_or_else(|| file.size()),
            original_filename: data.original_filename.or_else(|| Some(file.name.clone())),
            delete_token: data.delete_token,
        })
    }

    async fn discard(&self, media: &UploadedMedia) -> Result<(), UploadError> {
        let Some(token) = media.delete_token.as_deref() else {
            warn!(url = %media.url, "no delete token, upload left orphaned");
            return Err(UploadError::new("upload cannot be discarded without a delete token"));
        };
        let res = self
            .client
            .post(self.delete_endpoint())
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| UploadError::new(e.to_string()))?;
        if !res.status().is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(UploadError::new(extract_error_message(&body)));
        }
        debug!(url = %media.url, "upload discarded");
        Ok(())
    }
}
