//! Configurable in-process adapter
//!
//! Simulates success, failure, a disabled adapter, and latency without any
//! network access. Call counts are shared through `Arc`s so a test can keep a
//! handle after handing the adapter to the publisher.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::platforms::PlatformAdapter;
use crate::types::{Platform, PostResult};

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// A disabled mock reports `"<platform> not configured"`
    pub enabled: bool,

    pub post_succeeds: bool,

    /// Id returned on success; a generated id is used when unset
    pub post_id: Option<String>,

    pub post_error: Option<String>,

    /// Simulated network latency
    pub delay: Duration,

    pub post_call_count: Arc<AtomicUsize>,

    /// Every (content, image_url) pair the mock was asked to publish
    pub posted: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            enabled: true,
            post_succeeds: true,
            post_id: None,
            post_error: None,
            delay: Duration::ZERO,
            post_call_count: Arc::new(AtomicUsize::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Succeeds with the given post id
    pub fn success(platform: Platform, post_id: &str) -> Self {
        Self::new(MockConfig {
            post_id: Some(post_id.to_string()),
            ..MockConfig::new(platform)
        })
    }

    pub fn failure(platform: Platform, error: &str) -> Self {
        Self::new(MockConfig {
            post_succeeds: false,
            post_error: Some(error.to_string()),
            ..MockConfig::new(platform)
        })
    }

    pub fn disabled(platform: Platform) -> Self {
        Self::new(MockConfig {
            enabled: false,
            ..MockConfig::new(platform)
        })
    }

    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    pub fn post_call_count(&self) -> usize {
        self.config.post_call_count.load(Ordering::SeqCst)
    }

    /// Shared counter, still readable after the mock is moved
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.config.post_call_count.clone()
    }

    pub fn posted(&self) -> Vec<(String, Option<String>)> {
        self.config
            .posted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl PlatformAdapter for MockPlatform {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn post(&self, content: &str, image_url: Option<&str>) -> PostResult {
        if !self.config.enabled {
            return PostResult::failed(format!("{} not configured", self.config.platform));
        }

        self.config.post_call_count.fetch_add(1, Ordering::SeqCst);

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.post_succeeds {
            self.config
                .posted
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((content.to_string(), image_url.map(str::to_string)));

            let post_id = self.config.post_id.clone().unwrap_or_else(|| {
                format!("{}:mock-{}", self.config.platform, uuid::Uuid::new_v4())
            });
            PostResult::posted(post_id)
        } else {
            PostResult::failed(
                self.config
                    .post_error
                    .clone()
                    .unwrap_or_else(|| "Mock posting failed".to_string()),
            )
        }
    }
}
