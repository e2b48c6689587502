//! Twitter/X adapter (API v2)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::credentials::{CredentialStore, PlatformCredentials};
use crate::error::PlatformError;
use crate::platforms::{http_client, into_post_result, load_credentials, PlatformAdapter};
use crate::types::{Platform, PostResult};

pub const CHARACTER_LIMIT: usize = 280;

/// Largest local image the adapter will read (the v2 image upload limit)
pub const MAX_MEDIA_BYTES: u64 = 5 * 1024 * 1024;

pub struct TwitterPlatform {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    base_url: String,
    /// Only files under this directory are ever read for upload
    media_dir: Option<PathBuf>,
}

/// Cut content longer than the tweet limit to 277 characters plus `"..."`
pub fn truncate_for_tweet(content: &str) -> String {
    if content.chars().count() > CHARACTER_LIMIT {
        let head: String = content.chars().take(CHARACTER_LIMIT - 3).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

/// Local file behind an image reference, if it names one.
///
/// Remote URLs are not uploaded.
fn local_media_path(image_url: &str) -> Option<PathBuf> {
    if let Some(stripped) = image_url.strip_prefix("file://") {
        return Some(PathBuf::from(stripped));
    }
    let path = Path::new(image_url);
    path.is_absolute().then(|| path.to_path_buf())
}

fn outside_media_dir() -> PlatformError {
    PlatformError::Validation("Local media must be inside the media directory".to_string())
}

fn media_too_large() -> PlatformError {
    PlatformError::Validation(format!(
        "Local media exceeds the {} byte upload limit",
        MAX_MEDIA_BYTES
    ))
}

impl TwitterPlatform {
    pub fn new(credentials: Arc<dyn CredentialStore>, base_url: &str) -> Self {
        Self {
            client: http_client(),
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            media_dir: None,
        }
    }

    /// Allow local image uploads from `media_dir`; `None` keeps them disabled
    pub fn with_media_dir(mut self, media_dir: Option<PathBuf>) -> Self {
        self.media_dir = media_dir;
        self
    }

    async fn credentials(&self) -> Result<PlatformCredentials, PlatformError> {
        load_credentials(self.credentials.as_ref(), Platform::Twitter, |_| true).await
    }

    /// Resolve a local image reference to a regular file inside the media directory.
    ///
    /// Symlinks and `..` are resolved before the containment check. Nothing is
    /// read here.
    async fn resolve_local_media(&self, reference: &Path) -> Result<PathBuf, PlatformError> {
        let Some(media_dir) = &self.media_dir else {
            return Err(PlatformError::Validation(
                "Local media uploads are not enabled".to_string(),
            ));
        };

        let root = tokio::fs::canonicalize(media_dir).await.map_err(|e| {
            PlatformError::Validation(format!("Media directory unavailable: {}", e))
        })?;
        let resolved = tokio::fs::canonicalize(reference)
            .await
            .map_err(|_| outside_media_dir())?;
        if !resolved.starts_with(&root) {
            return Err(outside_media_dir());
        }

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| outside_media_dir())?;
        if !metadata.is_file() {
            return Err(PlatformError::Validation(
                "Local media is not a regular file".to_string(),
            ));
        }
        if metadata.len() > MAX_MEDIA_BYTES {
            return Err(media_too_large());
        }

        Ok(resolved)
    }

    async fn upload_media(&self, token: &str, file: &Path) -> Result<String, PlatformError> {
        let read_error =
            |e: std::io::Error| PlatformError::Validation(format!("Failed to read media: {}", e));
        let handle = tokio::fs::File::open(file).await.map_err(read_error)?;
        let mut bytes = Vec::new();
        // the file may have grown since it was checked
        handle
            .take(MAX_MEDIA_BYTES + 1)
            .read_to_end(&mut bytes)
            .await
            .map_err(read_error)?;
        if bytes.len() as u64 > MAX_MEDIA_BYTES {
            return Err(media_too_large());
        }

        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "media".to_string());

        let form = Form::new().part("media", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(format!("{}/2/media/upload", self.base_url))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let data: serde_json::Value = response.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PlatformError::Posting(error_detail(&data, status)));
        }

        data.pointer("/data/id")
            .or_else(|| data.get("media_id_string"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("Media upload returned no id".to_string()))
    }

    async fn try_post(&self, content: &str, image_url: Option<&str>) -> Result<String, PlatformError> {
        let credentials = self.credentials().await?;
        let token = credentials.access_token.expose_secret();
        let text = truncate_for_tweet(content);

        let mut body = json!({ "text": text });
        if let Some(reference) = image_url.and_then(local_media_path) {
            let file = self.resolve_local_media(&reference).await?;
            let media_id = self.upload_media(token, &file).await?;
            body["media"] = json!({ "media_ids": [media_id] });
        }

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let data: serde_json::Value = response.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PlatformError::Posting(error_detail(&data, status)));
        }

        data.pointer("/data/id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("Tweet response missing data.id".to_string()))
    }
}

/// Human-readable error from a v2 error payload
fn error_detail(data: &serde_json::Value, status: reqwest::StatusCode) -> String {
    data.get("detail")
        .or_else(|| data.pointer("/errors/0/message"))
        .or_else(|| data.get("title"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Twitter API returned {}", status))
}

#[async_trait]
impl PlatformAdapter for TwitterPlatform {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn is_enabled(&self) -> bool {
        self.credentials().await.is_ok()
    }

    async fn post(&self, content: &str, image_url: Option<&str>) -> PostResult {
        into_post_result(Platform::Twitter, self.try_post(content, image_url).await)
    }
}
