//! Instagram adapter
//!
//! Publishing goes through the Graph API in two steps: create a media container
//! from a public image URL, then publish that container. Text-only posts are
//! not possible.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::credentials::{CredentialStore, PlatformCredentials};
use crate::error::PlatformError;
use crate::platforms::facebook::id_string;
use crate::platforms::{
    graph_error_message, http_client, into_post_result, load_credentials, PlatformAdapter,
};
use crate::types::{Platform, PostResult};

pub struct InstagramPlatform {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    graph_url: String,
}

impl InstagramPlatform {
    pub fn new(credentials: Arc<dyn CredentialStore>, graph_url: &str) -> Self {
        Self {
            client: http_client(),
            credentials,
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }

    async fn credentials(&self) -> Result<PlatformCredentials, PlatformError> {
        load_credentials(self.credentials.as_ref(), Platform::Instagram, |c| {
            c.account_id.is_some()
        })
        .await
    }

    async fn graph_post(&self, path: &str, params: &[(&str, &str)]) -> Result<serde_json::Value, PlatformError> {
        let response = self
            .client
            .post(format!("{}/{}", self.graph_url, path))
            .query(params)
            .send()
            .await?;

        response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid Graph API response: {}", e)))
    }

    async fn try_post(&self, content: &str, image_url: Option<&str>) -> Result<String, PlatformError> {
        let credentials = self.credentials().await?;
        let Some(image_url) = image_url else {
            return Err(PlatformError::Validation(
                "Instagram requires an image URL".to_string(),
            ));
        };
        let account_id = credentials
            .account_id
            .as_deref()
            .ok_or(PlatformError::NotConfigured(Platform::Instagram))?;
        let token = credentials.access_token.expose_secret();

        let container = self
            .graph_post(
                &format!("{}/media", account_id),
                &[("access_token", token), ("image_url", image_url), ("caption", content)],
            )
            .await?;
        let creation_id = container.get("id").and_then(id_string).ok_or_else(|| {
            PlatformError::Posting(graph_error_message(
                &container,
                "Failed to create media container",
            ))
        })?;

        tracing::debug!(creation_id = %creation_id, "Created Instagram media container");

        let published = self
            .graph_post(
                &format!("{}/media_publish", account_id),
                &[("access_token", token), ("creation_id", creation_id.as_str())],
            )
            .await?;

        published
            .get("id")
            .and_then(id_string)
            .ok_or_else(|| PlatformError::Posting(graph_error_message(&published, "Failed to publish")))
    }
}

#[async_trait]
impl PlatformAdapter for InstagramPlatform {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn is_enabled(&self) -> bool {
        self.credentials().await.is_ok()
    }

    async fn post(&self, content: &str, image_url: Option<&str>) -> PostResult {
        into_post_result(Platform::Instagram, self.try_post(content, image_url).await)
    }
}
