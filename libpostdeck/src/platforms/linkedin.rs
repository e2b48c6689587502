//! LinkedIn adapter (UGC posts API)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::json;
use std::sync::Arc;

use crate::credentials::{CredentialStore, PlatformCredentials};
use crate::error::PlatformError;
use crate::platforms::{http_client, into_post_result, load_credentials, PlatformAdapter};
use crate::types::{Platform, PostResult};

pub struct LinkedInPlatform {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    base_url: String,
}

impl LinkedInPlatform {
    pub fn new(credentials: Arc<dyn CredentialStore>, base_url: &str) -> Self {
        Self {
            client: http_client(),
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn credentials(&self) -> Result<PlatformCredentials, PlatformError> {
        load_credentials(self.credentials.as_ref(), Platform::LinkedIn, |_| true).await
    }

    /// Member id (`sub`) of the token owner
    async fn member_id(&self, token: &str) -> Result<String, PlatformError> {
        let response = self
            .client
            .get(format!("{}/v2/userinfo", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Authentication(
                "Could not get LinkedIn user ID".to_string(),
            ));
        }

        let data: serde_json::Value = response.json().await?;
        data.get("sub")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Authentication("Could not get LinkedIn user ID".to_string()))
    }

    async fn try_post(&self, content: &str) -> Result<String, PlatformError> {
        let credentials = self.credentials().await?;
        let token = credentials.access_token.expose_secret();
        let member_id = self.member_id(token).await?;

        let body = json!({
            "author": format!("urn:li:person:{}", member_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": content },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        let response = self
            .client
            .post(format!("{}/v2/ugcPosts", self.base_url))
            .bearer_auth(token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let text = response.text().await.unwrap_or_default();
            return Err(PlatformError::Posting(text));
        }

        let post_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(post_id)
    }
}

#[async_trait]
impl PlatformAdapter for LinkedInPlatform {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn is_enabled(&self) -> bool {
        self.credentials().await.is_ok()
    }

    /// Images are not attached; LinkedIn shares are text only here.
    async fn post(&self, content: &str, _image_url: Option<&str>) -> PostResult {
        into_post_result(Platform::LinkedIn, self.try_post(content).await)
    }
}
