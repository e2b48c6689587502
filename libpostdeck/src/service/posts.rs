//! Post lifecycle: generation, manual creation, edits, approval, deletion
//!
//! Publishing lives in [`crate::publisher`]; this service keeps the one-shot
//! timers in step with each post's `scheduled_time`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{PostdeckError, Result};
use crate::generation::{ContentGenerator, GeneratedContent, GeneratedImage, GenerationRequest};
use crate::scheduler::Scheduler;
use crate::types::{
    dedup_platforms, word_count, ContentType, Platform, Post, PostFilter, PostStatus, PostUpdate,
};

/// Largest page `list` returns
pub const MAX_PAGE_SIZE: u32 = 100;

fn default_platforms() -> Vec<Platform> {
    vec![Platform::LinkedIn]
}

fn default_generated_type() -> ContentType {
    ContentType::Educational
}

/// Request to generate a post with the content generator
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePostRequest {
    #[serde(default = "default_generated_type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    /// Generated posts skip the approval queue when set
    #[serde(default)]
    pub auto_post: bool,
}

/// Request to store a hand-written post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub auto_post: bool,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl CreatePostRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            image_url: None,
            image_prompt: None,
            content_type: ContentType::Custom,
            topic: None,
            platforms: default_platforms(),
            auto_post: false,
            scheduled_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPost {
    pub post: Post,
    pub generation: GeneratedContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    /// Matching posts across all pages
    pub total: i64,
}

#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
    scheduler: Scheduler,
    generator: Arc<dyn ContentGenerator>,
}

impl PostService {
    pub fn new(db: Arc<Database>, scheduler: Scheduler, generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            db,
            scheduler,
            generator,
        }
    }

    /// Generate a post and store it for approval.
    ///
    /// The post starts `approved` when `auto_post` is set, otherwise
    /// `pending_approval`.
    pub async fn generate(&self, request: GeneratePostRequest) -> Result<GeneratedPost> {
        let platforms = dedup_platforms(&request.platforms);
        let generation = self
            .generator
            .generate(&GenerationRequest {
                content_type: request.content_type,
                topic: request.topic.clone(),
                platforms: platforms.clone(),
                custom_prompt: request.custom_prompt,
            })
            .await?;

        let mut post = Post::new(generation.content.clone());
        post.image_prompt = Some(generation.image_prompt.clone()).filter(|p| !p.is_empty());
        post.content_type = request.content_type;
        post.topic = request.topic;
        post.platforms = platforms;
        post.auto_post = request.auto_post;
        post.status = if request.auto_post {
            PostStatus::Approved
        } else {
            PostStatus::PendingApproval
        };

        self.db.create_post(&post).await?;
        info!(post_id = %post.id, status = %post.status, "Generated post");

        Ok(GeneratedPost { post, generation })
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage> {
        if prompt.trim().is_empty() {
            return Err(PostdeckError::InvalidInput("Image prompt is empty".to_string()));
        }
        Ok(self.generator.generate_image(prompt).await?)
    }

    /// Store a hand-written post.
    ///
    /// With a schedule time the post starts `scheduled` and a one-shot timer is
    /// armed; otherwise it is a `draft`.
    pub async fn create(&self, request: CreatePostRequest) -> Result<Post> {
        let mut post = Post::new(request.content);
        post.image_url = request.image_url;
        post.image_prompt = request.image_prompt;
        post.content_type = request.content_type;
        post.topic = request.topic;
        post.platforms = dedup_platforms(&request.platforms);
        post.auto_post = request.auto_post;
        post.scheduled_time = request.scheduled_time;
        post.status = if request.scheduled_time.is_some() {
            PostStatus::Scheduled
        } else {
            PostStatus::Draft
        };

        self.db.create_post(&post).await?;
        info!(post_id = %post.id, status = %post.status, "Created post");

        if let Some(run_at) = post.scheduled_time {
            self.arm_timer(&post.id, run_at);
        }

        Ok(post)
    }

    pub async fn get(&self, post_id: &str) -> Result<Post> {
        self.db.get_post(post_id).await?.ok_or_else(not_found)
    }

    /// Newest first; the page size is capped at [`MAX_PAGE_SIZE`]
    pub async fn list(&self, mut filter: PostFilter) -> Result<PostPage> {
        filter.limit = filter.limit.min(MAX_PAGE_SIZE);
        let (posts, total) = self.db.list_posts(&filter).await?;
        Ok(PostPage { posts, total })
    }

    /// Apply a partial update.
    ///
    /// Setting `scheduled_time` re-arms the post's timer. The `publishing`
    /// status is reserved for the publish claim and is rejected here, as is any
    /// edit to a post a publish currently holds and any status change on a
    /// published post.
    pub async fn update(&self, post_id: &str, update: PostUpdate) -> Result<Post> {
        if update.status == Some(PostStatus::Publishing) {
            return Err(PostdeckError::InvalidInput(
                "Status cannot be set to publishing".to_string(),
            ));
        }

        let mut post = self.get(post_id).await?;
        let read_status = post.status;
        match read_status {
            PostStatus::Publishing => return Err(in_progress()),
            PostStatus::Posted if update.status.is_some_and(|s| s != PostStatus::Posted) => {
                return Err(already_published())
            }
            _ => {}
        }

        if let Some(content) = update.content {
            post.word_count = word_count(&content);
            post.content = content;
        }
        if let Some(image_url) = update.image_url {
            post.image_url = Some(image_url);
        }
        if let Some(platforms) = update.platforms {
            post.platforms = dedup_platforms(&platforms);
        }
        if let Some(status) = update.status {
            post.status = status;
        }
        if let Some(scheduled_time) = update.scheduled_time {
            post.scheduled_time = Some(scheduled_time);
        }
        if let Some(auto_post) = update.auto_post {
            post.auto_post = auto_post;
        }

        if !self.db.update_post(&post, read_status).await? {
            return Err(self.refusal(post_id).await);
        }
        debug!(post_id = %post_id, "Updated post");

        if let Some(run_at) = update.scheduled_time {
            self.arm_timer(post_id, run_at);
        }

        self.get(post_id).await
    }

    /// Mark a post approved.
    ///
    /// Published posts and posts a publish currently holds are refused.
    pub async fn approve(&self, post_id: &str) -> Result<Post> {
        if !self
            .db
            .transition_status(post_id, &PostStatus::PUBLISHABLE, PostStatus::Approved)
            .await?
        {
            return Err(self.refusal(post_id).await);
        }
        info!(post_id = %post_id, "Approved post");
        self.get(post_id).await
    }

    /// Hard delete; the post's pending timer is cancelled
    pub async fn delete(&self, post_id: &str) -> Result<()> {
        self.scheduler.cancel(post_id);
        if !self.db.delete_post(post_id).await? {
            return Err(not_found());
        }
        info!(post_id = %post_id, "Deleted post");
        Ok(())
    }

    /// Why a conditional write on `post_id` did not take effect
    async fn refusal(&self, post_id: &str) -> PostdeckError {
        match self.db.get_post(post_id).await {
            Ok(None) => not_found(),
            Ok(Some(post)) if post.status == PostStatus::Posted => already_published(),
            Ok(Some(_)) => in_progress(),
            Err(e) => e,
        }
    }

    fn arm_timer(&self, post_id: &str, run_at: DateTime<Utc>) {
        if !self.scheduler.schedule_post(post_id, run_at) {
            // past times are left to the periodic scan
            debug!(post_id = %post_id, run_at = %run_at, "No timer armed");
        }
    }
}

fn not_found() -> PostdeckError {
    PostdeckError::NotFound("Post not found".to_string())
}

fn in_progress() -> PostdeckError {
    PostdeckError::Conflict("Post publish already in progress".to_string())
}

fn already_published() -> PostdeckError {
    PostdeckError::Conflict("Post already published".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::platforms::mock::MockPlatform;
    use crate::platforms::PlatformAdapter;
    use crate::poster::MultiPlatformPoster;
    use crate::publisher::Publisher;
    use std::sync::atomic::Ordering;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedGenerator;

    #[async_trait]
    impl ContentGenerator for FixedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> std::result::Result<GeneratedContent, GenerationError> {
            Ok(GeneratedContent {
                content: format!("Post about {}", request.topic.as_deref().unwrap_or("nothing")),
                image_prompt: "a lighthouse".to_string(),
                hashtags: vec!["#rust".to_string()],
            })
        }

        async fn generate_image(&self, _prompt: &str) -> std::result::Result<GeneratedImage, GenerationError> {
            Err(GenerationError::NotConfigured)
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    async fn service() -> (PostService, Scheduler) {
        let (posts, scheduler, _) = service_with(vec![]).await;
        (posts, scheduler)
    }

    async fn service_with(
        adapters: Vec<Arc<dyn PlatformAdapter>>,
    ) -> (PostService, Scheduler, Arc<Database>) {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        let publisher = Publisher::new(db.clone(), Arc::new(MultiPlatformPoster::new(adapters)));
        let scheduler = Scheduler::new(db.clone(), publisher, Duration::from_secs(60));
        (
            PostService::new(db.clone(), scheduler.clone(), Arc::new(FixedGenerator)),
            scheduler,
            db,
        )
    }

    #[tokio::test]
    async fn test_create_without_schedule_is_draft() {
        let (posts, scheduler) = service().await;
        let post = posts.create(CreatePostRequest::new("Hello there world")).await.unwrap();

        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.word_count, 3);
        assert_eq!(post.platforms, vec![Platform::LinkedIn]);
        assert!(!scheduler.is_scheduled(&post.id));
    }

    #[tokio::test]
    async fn test_create_with_schedule_arms_timer() {
        let (posts, scheduler) = service().await;
        let mut request = CreatePostRequest::new("Later");
        request.scheduled_time = Some(Utc::now() + chrono::Duration::hours(1));

        let post = posts.create(request).await.unwrap();

        assert_eq!(post.status, PostStatus::Scheduled);
        assert!(scheduler.is_scheduled(&post.id));
    }

    #[tokio::test]
    async fn test_generate_sets_status_from_auto_post() {
        let (posts, _) = service().await;
        let request = GeneratePostRequest {
            content_type: ContentType::Motivation,
            topic: Some("mornings".to_string()),
            platforms: vec![Platform::Twitter, Platform::Twitter],
            custom_prompt: None,
            auto_post: false,
        };

        let generated = posts.generate(request.clone()).await.unwrap();
        assert_eq!(generated.post.status, PostStatus::PendingApproval);
        assert_eq!(generated.post.content, "Post about mornings");
        assert_eq!(generated.post.image_prompt.as_deref(), Some("a lighthouse"));
        assert_eq!(generated.post.platforms, vec![Platform::Twitter]);

        let auto = posts
            .generate(GeneratePostRequest {
                auto_post: true,
                ..request
            })
            .await
            .unwrap();
        assert_eq!(auto.post.status, PostStatus::Approved);
    }

    #[tokio::test]
    async fn test_update_recomputes_word_count_and_rejects_publishing() {
        let (posts, _) = service().await;
        let post = posts.create(CreatePostRequest::new("one")).await.unwrap();

        let updated = posts
            .update(
                &post.id,
                PostUpdate {
                    content: Some("one two three four".to_string()),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.word_count, 4);

        let err = posts
            .update(
                &post.id,
                PostUpdate {
                    status: Some(PostStatus::Publishing),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PostdeckError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_with_schedule_rearms_timer() {
        let (posts, scheduler) = service().await;
        let post = posts.create(CreatePostRequest::new("x")).await.unwrap();
        let run_at = Utc::now() + chrono::Duration::minutes(30);

        posts
            .update(
                &post.id,
                PostUpdate {
                    scheduled_time: Some(run_at),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap();

        let jobs = scheduler.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].next_run, Some(run_at));
    }

    #[tokio::test]
    async fn test_approve_and_delete() {
        let (posts, scheduler) = service().await;
        let mut request = CreatePostRequest::new("x");
        request.scheduled_time = Some(Utc::now() + chrono::Duration::hours(1));
        let post = posts.create(request).await.unwrap();

        assert_eq!(posts.approve(&post.id).await.unwrap().status, PostStatus::Approved);

        posts.delete(&post.id).await.unwrap();
        assert!(!scheduler.is_scheduled(&post.id));
        assert!(matches!(
            posts.get(&post.id).await.unwrap_err(),
            PostdeckError::NotFound(_)
        ));
        assert!(matches!(
            posts.delete(&post.id).await.unwrap_err(),
            PostdeckError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_approve_published_post_is_conflict() {
        let twitter = MockPlatform::success(Platform::Twitter, "tw-1");
        let calls = twitter.call_counter();
        let (posts, scheduler, db) = service_with(vec![Arc::new(twitter)]).await;

        let mut post = Post::new("Already out".to_string());
        post.platforms = vec![Platform::Twitter];
        post.status = PostStatus::Scheduled;
        post.scheduled_time = Some(Utc::now() - chrono::Duration::minutes(1));
        db.create_post(&post).await.unwrap();

        scheduler.process_due_posts().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = posts.approve(&post.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Post already published");

        let err = posts
            .update(
                &post.id,
                PostUpdate {
                    status: Some(PostStatus::Approved),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Post already published");

        // a later scan must not pick it up again
        let summary = scheduler.process_due_posts().await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(posts.get(&post.id).await.unwrap().status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_edits_never_release_a_publish_claim() {
        let (posts, _, db) = service_with(vec![]).await;
        let post = posts.create(CreatePostRequest::new("held")).await.unwrap();
        posts.approve(&post.id).await.unwrap();

        assert!(db
            .claim_for_publish(&post.id, &PostStatus::DUE)
            .await
            .unwrap());

        let err = posts.approve(&post.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Post publish already in progress");

        let err = posts
            .update(
                &post.id,
                PostUpdate {
                    content: Some("edited".to_string()),
                    ..PostUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PostdeckError::Conflict(_)));

        let stored = posts.get(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Publishing);
        assert_eq!(stored.content, "held");
    }

    #[tokio::test]
    async fn test_approve_missing_post_is_not_found() {
        let (posts, _) = service().await;
        assert!(matches!(
            posts.approve("nope").await.unwrap_err(),
            PostdeckError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_list_caps_page_size() {
        let (posts, _) = service().await;
        for i in 0..3 {
            posts.create(CreatePostRequest::new(format!("post {}", i))).await.unwrap();
        }

        let page = posts
            .list(PostFilter {
                limit: 500,
                ..PostFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 3);
        assert_eq!(page.total, 3);
        assert_eq!(page.posts[0].content, "post 2");

        let page = posts
            .list(PostFilter {
                limit: 1,
                offset: 1,
                ..PostFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].content, "post 1");
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_generate_image_rejects_blank_prompt() {
        let (posts, _) = service().await;
        assert!(matches!(
            posts.generate_image("  ").await.unwrap_err(),
            PostdeckError::InvalidInput(_)
        ));
    }
}
