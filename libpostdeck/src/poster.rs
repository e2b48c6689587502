//! Multi-platform publish orchestration
//!
//! [`MultiPlatformPoster`] fans one piece of content out to the adapters for
//! the requested platforms and collects one [`PostResult`] per platform.
//! [`aggregate`] then folds those results into the post's new status.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::platforms::{adapters_from_config, PlatformAdapter};
use crate::types::{dedup_platforms, Platform, Post, PostResult, PostStatus, PostedIds};

/// Per-platform results of one publish attempt
pub type PublishResults = BTreeMap<Platform, PostResult>;

/// Error message recorded when a post targets no platforms at all
pub const NO_PLATFORMS_MESSAGE: &str = "No platforms configured";

pub const INSTAGRAM_IMAGE_REQUIRED: &str = "Instagram requires an image";

/// Aggregate outcome of a publish attempt, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub status: PostStatus,
    /// Ids of the platforms that succeeded
    pub posted_ids: PostedIds,
    /// `None` only when every platform succeeded
    pub error_message: Option<String>,
    pub all_success: bool,
}

/// Fold per-platform results into a post status.
///
/// Any success makes the post `posted`; failures are still listed in the error
/// message as `"<platform>: <error>"` joined by `"; "`, in the order the
/// platforms were `requested`.
pub fn aggregate(results: &PublishResults, requested: &[Platform]) -> PublishOutcome {
    if results.is_empty() {
        return PublishOutcome {
            status: PostStatus::Failed,
            posted_ids: PostedIds::new(),
            error_message: Some(NO_PLATFORMS_MESSAGE.to_string()),
            all_success: false,
        };
    }

    let posted_ids: PostedIds = results
        .iter()
        .filter(|(_, r)| r.success)
        .map(|(platform, r)| (*platform, r.post_id.clone().unwrap_or_default()))
        .collect();

    let errors: Vec<String> = report_order(results, requested)
        .into_iter()
        .filter_map(|platform| {
            let result = &results[&platform];
            (!result.success).then(|| {
                format!(
                    "{}: {}",
                    platform,
                    result.error.as_deref().unwrap_or("Unknown error")
                )
            })
        })
        .collect();

    let all_success = errors.is_empty();
    let status = if posted_ids.is_empty() {
        PostStatus::Failed
    } else {
        PostStatus::Posted
    };

    PublishOutcome {
        status,
        posted_ids,
        error_message: (!all_success).then(|| errors.join("; ")),
        all_success,
    }
}

/// Result keys in request order; any the request did not name follow in platform order
fn report_order(results: &PublishResults, requested: &[Platform]) -> Vec<Platform> {
    let mut order: Vec<Platform> = dedup_platforms(requested)
        .into_iter()
        .filter(|platform| results.contains_key(platform))
        .collect();
    let unrequested: Vec<Platform> = results
        .keys()
        .filter(|platform| !order.contains(platform))
        .copied()
        .collect();
    order.extend(unrequested);
    order
}

/// Dispatches content to registered platform adapters
pub struct MultiPlatformPoster {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl MultiPlatformPoster {
    /// Register adapters; a later adapter for the same platform replaces an earlier one
    pub fn new(adapters: Vec<Arc<dyn PlatformAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();
        Self { adapters }
    }

    /// The four network adapters, reading tokens from `credentials`
    pub fn from_config(config: &Config, credentials: Arc<dyn CredentialStore>) -> Self {
        Self::new(adapters_from_config(config, credentials))
    }

    pub fn adapter(&self, platform: Platform) -> Option<&Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform)
    }

    /// Whether each known platform currently has a usable adapter
    pub async fn enabled_platforms(&self) -> BTreeMap<Platform, bool> {
        let mut enabled = BTreeMap::new();
        for platform in Platform::ALL {
            let is_enabled = match self.adapters.get(&platform) {
                Some(adapter) => adapter.is_enabled().await,
                None => false,
            };
            enabled.insert(platform, is_enabled);
        }
        enabled
    }

    /// Publish `content` to each requested platform concurrently.
    ///
    /// Returns exactly one result per distinct requested platform.
    pub async fn publish(
        &self,
        content: &str,
        platforms: &[Platform],
        image_url: Option<&str>,
    ) -> PublishResults {
        let targets = dedup_platforms(platforms);

        let futures = targets.into_iter().map(|platform| async move {
            let result = match self.adapters.get(&platform) {
                None => {
                    debug!(platform = %platform, "No adapter registered");
                    PostResult::failed(format!("{} not configured or not recognized", platform))
                }
                Some(_) if platform == Platform::Instagram && image_url.is_none() => {
                    PostResult::failed(INSTAGRAM_IMAGE_REQUIRED)
                }
                Some(adapter) => {
                    info!(platform = %platform, "Posting to platform");
                    adapter.post(content, image_url).await
                }
            };
            (platform, result)
        });

        join_all(futures).await.into_iter().collect()
    }

    /// Publish a stored post to its own platform list
    pub async fn publish_post(&self, post: &Post) -> PublishResults {
        self.publish(&post.content, &post.platforms, post.image_url.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;
    use std::time::{Duration, Instant};

    fn results(entries: Vec<(Platform, PostResult)>) -> PublishResults {
        entries.into_iter().collect()
    }

    fn aggregate_in_order(entries: Vec<(Platform, PostResult)>) -> PublishOutcome {
        let requested: Vec<Platform> = entries.iter().map(|(platform, _)| *platform).collect();
        aggregate(&results(entries), &requested)
    }

    #[test]
    fn test_aggregate_all_success() {
        let outcome = aggregate_in_order(vec![
            (Platform::LinkedIn, PostResult::posted("li-1")),
            (Platform::Twitter, PostResult::posted("tw-1")),
        ]);

        assert!(outcome.all_success);
        assert_eq!(outcome.status, PostStatus::Posted);
        assert_eq!(outcome.posted_ids.len(), 2);
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn test_aggregate_partial_success() {
        let outcome = aggregate_in_order(vec![
            (Platform::LinkedIn, PostResult::posted("li-1")),
            (Platform::Twitter, PostResult::failed("Rate limit exceeded")),
            (Platform::Facebook, PostResult::posted("fb-1")),
        ]);

        assert!(!outcome.all_success);
        assert_eq!(outcome.status, PostStatus::Posted);
        assert_eq!(
            outcome.posted_ids.keys().copied().collect::<Vec<_>>(),
            vec![Platform::LinkedIn, Platform::Facebook]
        );
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("twitter: Rate limit exceeded")
        );
    }

    #[test]
    fn test_aggregate_all_failed_joins_errors() {
        let outcome = aggregate_in_order(vec![
            (Platform::LinkedIn, PostResult::failed("linkedin not configured")),
            (Platform::Instagram, PostResult::failed(INSTAGRAM_IMAGE_REQUIRED)),
        ]);

        assert_eq!(outcome.status, PostStatus::Failed);
        assert!(outcome.posted_ids.is_empty());
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("linkedin: linkedin not configured; instagram: Instagram requires an image")
        );
    }

    #[test]
    fn test_aggregate_lists_errors_in_request_order() {
        let failures = results(vec![
            (Platform::LinkedIn, PostResult::failed("linkedin not configured")),
            (Platform::Twitter, PostResult::failed("Too Many Requests")),
        ]);

        let outcome = aggregate(
            &failures,
            &[Platform::Twitter, Platform::LinkedIn, Platform::Twitter],
        );

        assert_eq!(
            outcome.error_message.as_deref(),
            Some("twitter: Too Many Requests; linkedin: linkedin not configured")
        );
    }

    #[test]
    fn test_aggregate_empty_is_failed_with_sentinel() {
        let outcome = aggregate(&PublishResults::new(), &[]);
        assert_eq!(outcome.status, PostStatus::Failed);
        assert!(!outcome.all_success);
        assert_eq!(outcome.error_message.as_deref(), Some(NO_PLATFORMS_MESSAGE));
    }

    #[tokio::test]
    async fn test_one_result_per_requested_platform() {
        let poster = MultiPlatformPoster::new(vec![
            Arc::new(MockPlatform::success(Platform::Twitter, "1")),
            Arc::new(MockPlatform::success(Platform::Facebook, "2")),
        ]);

        let results = poster
            .publish(
                "hello",
                &[Platform::Twitter, Platform::Facebook, Platform::Twitter],
                None,
            )
            .await;

        assert_eq!(
            results.keys().copied().collect::<Vec<_>>(),
            vec![Platform::Twitter, Platform::Facebook]
        );
    }

    #[tokio::test]
    async fn test_unregistered_platform_is_not_recognized() {
        let poster = MultiPlatformPoster::new(vec![]);
        let results = poster.publish("hello", &[Platform::LinkedIn], None).await;
        assert_eq!(
            results[&Platform::LinkedIn],
            PostResult::failed("linkedin not configured or not recognized")
        );
    }

    #[tokio::test]
    async fn test_instagram_without_image_never_calls_adapter() {
        let instagram = MockPlatform::success(Platform::Instagram, "ig");
        let calls = instagram.call_counter();
        let poster = MultiPlatformPoster::new(vec![Arc::new(instagram)]);

        let results = poster.publish("caption", &[Platform::Instagram], None).await;

        assert_eq!(
            results[&Platform::Instagram],
            PostResult::failed(INSTAGRAM_IMAGE_REQUIRED)
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_adapter_reports_not_configured() {
        let poster = MultiPlatformPoster::new(vec![
            Arc::new(MockPlatform::disabled(Platform::LinkedIn)),
            Arc::new(MockPlatform::success(Platform::Twitter, "123")),
        ]);

        let results = poster
            .publish("Hello world", &[Platform::LinkedIn, Platform::Twitter], None)
            .await;

        assert_eq!(
            results[&Platform::LinkedIn],
            PostResult::failed("linkedin not configured")
        );
        assert_eq!(results[&Platform::Twitter], PostResult::posted("123"));

        let outcome = aggregate(&results, &[Platform::LinkedIn, Platform::Twitter]);
        assert_eq!(outcome.status, PostStatus::Posted);
        assert_eq!(
            outcome.posted_ids,
            PostedIds::from([(Platform::Twitter, "123".to_string())])
        );
    }

    #[tokio::test]
    async fn test_fan_out_is_concurrent() {
        let poster = MultiPlatformPoster::new(vec![
            Arc::new(MockPlatform::with_delay(Platform::LinkedIn, Duration::from_millis(200))),
            Arc::new(MockPlatform::with_delay(Platform::Twitter, Duration::from_millis(200))),
            Arc::new(MockPlatform::with_delay(Platform::Facebook, Duration::from_millis(200))),
        ]);

        let start = Instant::now();
        let results = poster
            .publish(
                "hello",
                &[Platform::LinkedIn, Platform::Twitter, Platform::Facebook],
                None,
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(start.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_enabled_platforms_covers_all() {
        let poster = MultiPlatformPoster::new(vec![
            Arc::new(MockPlatform::success(Platform::Twitter, "1")),
            Arc::new(MockPlatform::disabled(Platform::Facebook)),
        ]);

        let enabled = poster.enabled_platforms().await;
        assert_eq!(enabled.len(), 4);
        assert!(enabled[&Platform::Twitter]);
        assert!(!enabled[&Platform::Facebook]);
        assert!(!enabled[&Platform::LinkedIn]);
    }
}
