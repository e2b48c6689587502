//! Facebook Page adapter (Graph API)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::credentials::{CredentialStore, PlatformCredentials};
use crate::error::PlatformError;
use crate::platforms::{
    graph_error_message, http_client, into_post_result, load_credentials, PlatformAdapter,
};
use crate::types::{Platform, PostResult};

pub struct FacebookPlatform {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    graph_url: String,
}

impl FacebookPlatform {
    pub fn new(credentials: Arc<dyn CredentialStore>, graph_url: &str) -> Self {
        Self {
            client: http_client(),
            credentials,
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }

    async fn credentials(&self) -> Result<PlatformCredentials, PlatformError> {
        load_credentials(self.credentials.as_ref(), Platform::Facebook, |c| {
            c.page_id.is_some()
        })
        .await
    }

    async fn try_post(&self, content: &str, image_url: Option<&str>) -> Result<String, PlatformError> {
        let credentials = self.credentials().await?;
        let page_id = credentials
            .page_id
            .as_deref()
            .ok_or(PlatformError::NotConfigured(Platform::Facebook))?;
        let token = credentials.access_token.expose_secret();

        // Photos carry the text as a caption
        let request = match image_url {
            Some(url) => self
                .client
                .post(format!("{}/{}/photos", self.graph_url, page_id))
                .query(&[("access_token", token), ("url", url), ("message", content)]),
            None => self
                .client
                .post(format!("{}/{}/feed", self.graph_url, page_id))
                .query(&[("access_token", token), ("message", content)]),
        };

        let response = request.send().await?;
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid Graph API response: {}", e)))?;

        match data.get("id").and_then(id_string) {
            Some(id) => Ok(id),
            None => Err(PlatformError::Posting(graph_error_message(&data, "Unknown error"))),
        }
    }
}

/// Graph ids are usually strings but tolerate numbers
pub(crate) fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PlatformAdapter for FacebookPlatform {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn is_enabled(&self) -> bool {
        self.credentials().await.is_ok()
    }

    async fn post(&self, content: &str, image_url: Option<&str>) -> PostResult {
        into_post_result(Platform::Facebook, self.try_post(content, image_url).await)
    }
}
