//! Core types for Postdeck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PostdeckError;

/// A destination network.
///
/// The set is closed: anything outside it is rejected when parsed, so the
/// publish path never sees an unrecognized identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    Twitter,
    Facebook,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::LinkedIn,
        Platform::Twitter,
        Platform::Facebook,
        Platform::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PostdeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "twitter" | "x" => Ok(Platform::Twitter),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            other => Err(PostdeckError::InvalidInput(format!(
                "Unknown platform: {}",
                other
            ))),
        }
    }
}

/// Lifecycle state of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    PendingApproval,
    Approved,
    Scheduled,
    /// A publish attempt holds the post. Only the publish claim sets this.
    Publishing,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::PendingApproval => "pending_approval",
            PostStatus::Approved => "approved",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    /// States a manual publish or a one-shot timer may claim a post from
    pub const PUBLISHABLE: [PostStatus; 5] = [
        PostStatus::Draft,
        PostStatus::PendingApproval,
        PostStatus::Approved,
        PostStatus::Scheduled,
        PostStatus::Failed,
    ];

    /// States the periodic scan treats as due once scheduled_time has passed
    pub const DUE: [PostStatus; 2] = [PostStatus::Approved, PostStatus::Scheduled];
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = PostdeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "pending_approval" => Ok(PostStatus::PendingApproval),
            "approved" => Ok(PostStatus::Approved),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            other => Err(PostdeckError::InvalidInput(format!(
                "Unknown status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Educational,
    Motivation,
    Promotional,
    Engagement,
    News,
    #[default]
    Custom,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Educational => "educational",
            ContentType::Motivation => "motivation",
            ContentType::Promotional => "promotional",
            ContentType::Engagement => "engagement",
            ContentType::News => "news",
            ContentType::Custom => "custom",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = PostdeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "educational" => Ok(ContentType::Educational),
            "motivation" => Ok(ContentType::Motivation),
            "promotional" => Ok(ContentType::Promotional),
            "engagement" => Ok(ContentType::Engagement),
            "news" => Ok(ContentType::News),
            "custom" => Ok(ContentType::Custom),
            other => Err(PostdeckError::InvalidInput(format!(
                "Unknown content type: {}",
                other
            ))),
        }
    }
}

/// Native post ids keyed by the platform that produced them
pub type PostedIds = BTreeMap<Platform, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub image_prompt: Option<String>,
    pub content_type: ContentType,
    pub topic: Option<String>,
    pub word_count: i64,
    pub status: PostStatus,
    pub auto_post: bool,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub platforms: Vec<Platform>,
    pub posted_ids: PostedIds,
    pub posted_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// A draft targeting LinkedIn, the default destination
    pub fn new(content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            word_count: word_count(&content),
            content,
            image_url: None,
            image_prompt: None,
            content_type: ContentType::Custom,
            topic: None,
            status: PostStatus::Draft,
            auto_post: false,
            scheduled_time: None,
            platforms: vec![Platform::LinkedIn],
            posted_ids: PostedIds::new(),
            posted_time: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a post's editable fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostUpdate {
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub platforms: Option<Vec<Platform>>,
    pub status: Option<PostStatus>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub auto_post: Option<bool>,
}

/// Filter for listing posts, newest first
#[derive(Debug, Clone)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub content_type: Option<ContentType>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for PostFilter {
    fn default() -> Self {
        Self {
            status: None,
            content_type: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Outcome of one adapter call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostResult {
    pub fn posted(post_id: impl Into<String>) -> Self {
        Self {
            success: true,
            post_id: Some(post_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            post_id: None,
            error: Some(error.into()),
        }
    }
}

/// Number of whitespace-separated words
pub fn word_count(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

/// Remove repeated platforms, keeping first occurrence order
pub fn dedup_platforms(platforms: &[Platform]) -> Vec<Platform> {
    let mut seen = Vec::with_capacity(platforms.len());
    for platform in platforms {
        if !seen.contains(platform) {
            seen.push(*platform);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_serde_uses_lowercase_ids() {
        let json = serde_json::to_string(&vec![Platform::LinkedIn, Platform::Instagram]).unwrap();
        assert_eq!(json, r#"["linkedin","instagram"]"#);

        let parsed: Vec<Platform> = serde_json::from_str(r#"["twitter","facebook"]"#).unwrap();
        assert_eq!(parsed, vec![Platform::Twitter, Platform::Facebook]);
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        assert!(serde_json::from_str::<Platform>(r#""myspace""#).is_err());
        assert!("myspace".parse::<Platform>().is_err());
        assert_eq!("X".parse::<Platform>().unwrap(), Platform::Twitter);
    }

    #[test]
    fn test_platform_as_map_key() {
        let mut ids = PostedIds::new();
        ids.insert(Platform::Twitter, "123".to_string());
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#"{"twitter":"123"}"#);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            PostStatus::Draft,
            PostStatus::PendingApproval,
            PostStatus::Approved,
            PostStatus::Scheduled,
            PostStatus::Publishing,
            PostStatus::Posted,
            PostStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PostStatus>().unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&PostStatus::PendingApproval).unwrap(),
            r#""pending_approval""#
        );
    }

    #[test]
    fn test_post_new_defaults() {
        let post = Post::new("Hello big world".to_string());
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.word_count, 3);
        assert_eq!(post.platforms, vec![Platform::LinkedIn]);
        assert!(post.posted_ids.is_empty());
        assert!(Uuid::parse_str(&post.id).is_ok());
    }

    #[test]
    fn test_post_result_serialization_skips_absent_fields() {
        let ok = serde_json::to_value(PostResult::posted("123")).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "post_id": "123"}));

        let failed = serde_json::to_value(PostResult::failed("boom")).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_dedup_platforms_keeps_first_order() {
        let platforms = dedup_platforms(&[
            Platform::Twitter,
            Platform::LinkedIn,
            Platform::Twitter,
        ]);
        assert_eq!(platforms, vec![Platform::Twitter, Platform::LinkedIn]);
    }
}
