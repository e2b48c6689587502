//! Platform adapters
//!
//! One adapter per network. Every adapter makes a single attempt per call and
//! reports the outcome as a [`PostResult`]; failures never escape as errors.
//!
//! ```no_run
//! use std::sync::Arc;
//! use libpostdeck::credentials::MemoryStore;
//! use libpostdeck::platforms::{PlatformAdapter, twitter::TwitterPlatform};
//!
//! # async fn example() {
//! let store = Arc::new(MemoryStore::new());
//! let twitter = TwitterPlatform::new(store, "https://api.twitter.com");
//! let result = twitter.post("Hello from Postdeck", None).await;
//! if !result.success {
//!     eprintln!("twitter: {}", result.error.unwrap_or_default());
//! }
//! # }
//! ```

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::credentials::{CredentialStore, PlatformCredentials};
use crate::error::PlatformError;
use crate::types::{Platform, PostResult};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod twitter;

// Available outside tests so integration suites can register it
pub mod mock;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Network this adapter publishes to
    fn platform(&self) -> Platform;

    /// Whether the credentials this adapter needs are present
    async fn is_enabled(&self) -> bool;

    /// Publish `content`, optionally with an image reference.
    ///
    /// A disabled adapter returns `"<platform> not configured"` without any
    /// network call.
    async fn post(&self, content: &str, image_url: Option<&str>) -> PostResult;
}

/// HTTP client shared by the adapters
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        })
}

/// Load credentials and check they carry what the adapter needs
pub(crate) async fn load_credentials<F>(
    store: &dyn CredentialStore,
    platform: Platform,
    is_complete: F,
) -> Result<PlatformCredentials, PlatformError>
where
    F: Fn(&PlatformCredentials) -> bool,
{
    match store.load(platform).await {
        Ok(Some(credentials)) if is_complete(&credentials) => Ok(credentials),
        Ok(_) => Err(PlatformError::NotConfigured(platform)),
        Err(e) => Err(PlatformError::Authentication(format!(
            "Failed to load {} credentials: {}",
            platform, e
        ))),
    }
}

/// Render an adapter attempt as a [`PostResult`], logging the outcome
pub(crate) fn into_post_result(platform: Platform, outcome: Result<String, PlatformError>) -> PostResult {
    match outcome {
        Ok(post_id) => {
            tracing::info!(platform = %platform, post_id = %post_id, "Published");
            PostResult::posted(post_id)
        }
        Err(PlatformError::NotConfigured(p)) => {
            tracing::debug!(platform = %p, "Skipping unconfigured platform");
            PostResult::failed(PlatformError::NotConfigured(p).to_string())
        }
        Err(e) => {
            tracing::warn!(platform = %platform, error = %e, "Publish failed");
            PostResult::failed(e.to_string())
        }
    }
}

/// Graph API error text from a JSON payload, or `fallback`
pub(crate) fn graph_error_message(data: &serde_json::Value, fallback: &str) -> String {
    data.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(fallback)
        .to_string()
}

/// Build the four production adapters from configuration
pub fn adapters_from_config(
    config: &Config,
    credentials: Arc<dyn CredentialStore>,
) -> Vec<Arc<dyn PlatformAdapter>> {
    vec![
        Arc::new(linkedin::LinkedInPlatform::new(
            credentials.clone(),
            &config.linkedin.api_base_url,
        )),
        Arc::new(
            twitter::TwitterPlatform::new(credentials.clone(), &config.twitter.api_base_url)
                .with_media_dir(
                    config
                        .twitter
                        .media_dir
                        .as_deref()
                        .map(|dir| PathBuf::from(shellexpand::tilde(dir).to_string())),
                ),
        ),
        Arc::new(facebook::FacebookPlatform::new(
            credentials.clone(),
            &config.facebook.graph_base_url,
        )),
        Arc::new(instagram::InstagramPlatform::new(
            credentials,
            &config.facebook.graph_base_url,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryStore;

    #[tokio::test]
    async fn test_load_credentials_missing_is_not_configured() {
        let store = MemoryStore::new();
        let result = load_credentials(&store, Platform::Facebook, |_| true).await;
        assert_eq!(
            result.unwrap_err(),
            PlatformError::NotConfigured(Platform::Facebook)
        );
    }

    #[tokio::test]
    async fn test_load_credentials_incomplete_is_not_configured() {
        let store = MemoryStore::new();
        store
            .save(Platform::Facebook, PlatformCredentials::new("token"))
            .await
            .unwrap();

        let result = load_credentials(&store, Platform::Facebook, |c| c.page_id.is_some()).await;
        assert!(matches!(result, Err(PlatformError::NotConfigured(_))));
    }

    #[test]
    fn test_into_post_result_renders_errors() {
        let ok = into_post_result(Platform::Twitter, Ok("1".to_string()));
        assert_eq!(ok, PostResult::posted("1"));

        let missing = into_post_result(
            Platform::LinkedIn,
            Err(PlatformError::NotConfigured(Platform::LinkedIn)),
        );
        assert_eq!(missing.error.as_deref(), Some("linkedin not configured"));
    }

    #[test]
    fn test_graph_error_message_fallback() {
        let data = serde_json::json!({"error": {"message": "Invalid token"}});
        assert_eq!(graph_error_message(&data, "Unknown error"), "Invalid token");
        assert_eq!(
            graph_error_message(&serde_json::json!({}), "Unknown error"),
            "Unknown error"
        );
    }

    #[test]
    fn test_adapters_from_config_covers_every_platform() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new());
        let adapters = adapters_from_config(&Config::default(), store);
        let platforms: Vec<Platform> = adapters.iter().map(|a| a.platform()).collect();
        assert_eq!(platforms, Platform::ALL.to_vec());
    }
}
