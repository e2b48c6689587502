//! Claim, publish, and record a stored post
//!
//! Every path that publishes (the publish endpoint, the periodic scan, and
//! one-shot timers) goes through [`Publisher::publish_claimed`]. The claim is a
//! compare-and-swap on the post's status, so two triggers racing for the same
//! post produce at most one round of platform calls.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::{PostdeckError, Result};
use crate::poster::{aggregate, MultiPlatformPoster, PublishResults};
use crate::types::{Post, PostStatus};

/// Result of one completed publish attempt
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// The post as persisted after the attempt
    pub post: Post,
    pub results: PublishResults,
    pub all_success: bool,
}

#[derive(Clone)]
pub struct Publisher {
    db: Arc<Database>,
    poster: Arc<MultiPlatformPoster>,
}

impl Publisher {
    pub fn new(db: Arc<Database>, poster: Arc<MultiPlatformPoster>) -> Self {
        Self { db, poster }
    }

    pub fn poster(&self) -> &MultiPlatformPoster {
        &self.poster
    }

    /// Publish a post on request.
    ///
    /// # Errors
    ///
    /// `NotFound` when the post does not exist, `Conflict` when it is already
    /// posted or another publish holds it.
    pub async fn publish(&self, post_id: &str) -> Result<PublishReport> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| PostdeckError::NotFound("Post not found".to_string()))?;

        match post.status {
            PostStatus::Posted => {
                return Err(PostdeckError::Conflict("Post already published".to_string()))
            }
            PostStatus::Publishing => return Err(in_progress()),
            _ => {}
        }

        self.publish_claimed(post_id, &PostStatus::PUBLISHABLE)
            .await?
            .ok_or_else(in_progress)
    }

    /// Publish a post if it can be claimed from one of the `allowed` statuses.
    ///
    /// Returns `Ok(None)` when the claim was lost (the post is gone, already
    /// published, or held by another attempt). Once claimed, a failure while
    /// publishing or recording leaves the post `failed` rather than stuck in
    /// `publishing`.
    pub async fn publish_claimed(
        &self,
        post_id: &str,
        allowed: &[PostStatus],
    ) -> Result<Option<PublishReport>> {
        if !self.db.claim_for_publish(post_id, allowed).await? {
            return Ok(None);
        }

        match self.run_claimed(post_id).await {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                error!(post_id = %post_id, error = %e, "Publish attempt failed");
                if let Err(mark_err) = self.db.mark_failed(post_id, &e.to_string()).await {
                    warn!(post_id = %post_id, error = %mark_err, "Could not mark post failed");
                }
                Err(e)
            }
        }
    }

    async fn run_claimed(&self, post_id: &str) -> Result<PublishReport> {
        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| PostdeckError::NotFound("Post not found".to_string()))?;

        info!(
            post_id = %post_id,
            platforms = ?post.platforms,
            "Publishing post"
        );

        let results = self.poster.publish_post(&post).await;
        let outcome = aggregate(&results, &post.platforms);
        self.db.record_publish_outcome(post_id, &outcome).await?;

        if outcome.all_success {
            info!(post_id = %post_id, "Published to all platforms");
        } else {
            warn!(
                post_id = %post_id,
                status = %outcome.status,
                error = outcome.error_message.as_deref().unwrap_or_default(),
                "Publish finished with failures"
            );
        }

        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| PostdeckError::NotFound("Post not found".to_string()))?;

        Ok(PublishReport {
            post,
            results,
            all_success: outcome.all_success,
        })
    }
}

fn in_progress() -> PostdeckError {
    PostdeckError::Conflict("Post publish already in progress".to_string())
}
