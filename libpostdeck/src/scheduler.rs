//! Due-post scheduler
//!
//! Two mechanisms publish scheduled posts:
//!
//! - a periodic scan (`check_scheduled_posts`) that claims every approved or
//!   scheduled post whose time has passed, and
//! - one-shot timers (`post_<id>`) armed per post by [`Scheduler::schedule_post`].
//!
//! Both go through [`Publisher::publish_claimed`], so a post seen by both is
//! published once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::publisher::Publisher;
use crate::types::PostStatus;

/// Id of the periodic scan job
pub const PERIODIC_JOB_ID: &str = "check_scheduled_posts";

/// Error recorded on posts found mid-publish at startup
pub const INTERRUPTED_MESSAGE: &str = "publish interrupted";

/// A registered job as reported by [`Scheduler::jobs`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub next_run: Option<DateTime<Utc>>,
}

/// Counts from one pass of the periodic scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub due: usize,
    pub posted: usize,
    /// Due posts that did not publish, including ones that hit an error
    pub failed: usize,
    /// Due posts another trigger claimed first
    pub skipped: usize,
}

struct Timer {
    run_at: DateTime<Utc>,
    seq: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    db: Arc<Database>,
    publisher: Publisher,
    poll_interval: Duration,
    timers: Mutex<HashMap<String, Timer>>,
    next_seq: AtomicU64,
    next_scan: Mutex<Option<DateTime<Utc>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

/// Cheap to clone; clones share timers and the periodic loop
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

pub fn job_id(post_id: &str) -> String {
    format!("post_{}", post_id)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    pub fn new(db: Arc<Database>, publisher: Publisher, poll_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                db,
                publisher,
                poll_interval,
                timers: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                next_scan: Mutex::new(None),
                periodic: Mutex::new(None),
                shutdown,
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    /// Recover from a previous run and start the periodic scan.
    ///
    /// Calling `start` on a running scheduler does nothing.
    pub async fn start(&self) -> Result<()> {
        if lock(&self.inner.periodic).is_some() {
            return Ok(());
        }

        self.recover().await?;

        let scheduler = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let period = self.inner.poll_interval;
        self.set_next_scan(period);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.set_next_scan(period);
                        if let Err(e) = scheduler.process_due_posts().await {
                            error!(error = %e, "Error processing due posts");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Shutdown requested, stopping scheduler loop");
                            break;
                        }
                    }
                }
            }
        });

        *lock(&self.inner.periodic) = Some(handle);
        info!(
            poll_interval_secs = period.as_secs_f64(),
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop the periodic scan and abort every pending one-shot timer
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let periodic = lock(&self.inner.periodic).take();
        if let Some(handle) = periodic {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Scheduler loop ended abnormally");
                }
            }
        }
        *lock(&self.inner.next_scan) = None;

        let timers: Vec<Timer> = lock(&self.inner.timers).drain().map(|(_, t)| t).collect();
        for timer in &timers {
            timer.handle.abort();
        }
        info!(aborted_timers = timers.len(), "Scheduler stopped");
    }

    /// Fail posts a crashed process left in `publishing` and re-arm timers for
    /// posts scheduled in the future.
    pub async fn recover(&self) -> Result<()> {
        let interrupted = self.inner.db.fail_interrupted(INTERRUPTED_MESSAGE).await?;
        if interrupted > 0 {
            warn!(count = interrupted, "Marked interrupted publishes as failed");
        }

        let now = Utc::now();
        let upcoming = self.inner.db.future_scheduled_posts(now).await?;
        let mut restored = 0;
        for post in upcoming {
            if let Some(run_at) = post.scheduled_time {
                if self.schedule_post(&post.id, run_at) {
                    restored += 1;
                }
            }
        }
        if restored > 0 {
            info!(count = restored, "Restored scheduled post timers");
        }
        Ok(())
    }

    /// One pass of the periodic scan.
    ///
    /// A claimed post that errors is marked failed with the error text; the
    /// remaining due posts are still processed.
    pub async fn process_due_posts(&self) -> Result<ScanSummary> {
        let due = self.inner.db.due_posts(Utc::now()).await?;
        let mut summary = ScanSummary {
            due: due.len(),
            ..ScanSummary::default()
        };

        if due.is_empty() {
            debug!("No posts due");
            return Ok(summary);
        }

        info!(count = due.len(), "Found post(s) due for posting");

        for post in due {
            match self
                .inner
                .publisher
                .publish_claimed(&post.id, &PostStatus::DUE)
                .await
            {
                Ok(Some(report)) if report.post.status == PostStatus::Posted => summary.posted += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => {
                    debug!(post_id = %post.id, "Post claimed elsewhere, skipping");
                    summary.skipped += 1;
                }
                // a claimed post is already marked failed by the publisher; an
                // unclaimed one may belong to another trigger and is left alone
                Err(e) => {
                    error!(post_id = %post.id, error = %e, "Error publishing scheduled post");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Arm a one-shot timer that publishes `post_id` at `run_at`.
    ///
    /// Any existing timer for the post is cancelled first. Returns false, and
    /// arms nothing, when `run_at` is not in the future.
    pub fn schedule_post(&self, post_id: &str, run_at: DateTime<Utc>) -> bool {
        let id = job_id(post_id);
        let mut timers = lock(&self.inner.timers);

        if let Some(previous) = timers.remove(&id) {
            previous.handle.abort();
            debug!(post_id = %post_id, "Replaced existing timer");
        }

        let now = Utc::now();
        if run_at <= now {
            warn!(post_id = %post_id, run_at = %run_at, "Refusing to schedule in the past");
            return false;
        }
        let delay = (run_at - now).to_std().unwrap_or_default();

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let scheduler = self.clone();
        let owned_id = post_id.to_string();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            scheduler.fire(&owned_id, seq).await;
        });

        timers.insert(id, Timer { run_at, seq, handle });
        info!(post_id = %post_id, run_at = %run_at, "Scheduled post");
        true
    }

    /// Remove a post's pending timer; returns whether one existed
    pub fn cancel(&self, post_id: &str) -> bool {
        match lock(&self.inner.timers).remove(&job_id(post_id)) {
            Some(timer) => {
                timer.handle.abort();
                debug!(post_id = %post_id, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, post_id: &str) -> bool {
        lock(&self.inner.timers).contains_key(&job_id(post_id))
    }

    /// Registered jobs: the periodic scan while running, then one-shot timers
    /// in run order
    pub fn jobs(&self) -> Vec<JobInfo> {
        let mut jobs = Vec::new();

        if lock(&self.inner.periodic).is_some() {
            jobs.push(JobInfo {
                id: PERIODIC_JOB_ID.to_string(),
                next_run: *lock(&self.inner.next_scan),
            });
        }

        let mut timers: Vec<JobInfo> = lock(&self.inner.timers)
            .iter()
            .map(|(id, timer)| JobInfo {
                id: id.clone(),
                next_run: Some(timer.run_at),
            })
            .collect();
        timers.sort_by(|a, b| a.next_run.cmp(&b.next_run).then_with(|| a.id.cmp(&b.id)));
        jobs.extend(timers);

        jobs
    }

    fn set_next_scan(&self, period: Duration) {
        let next = chrono::Duration::from_std(period)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        *lock(&self.inner.next_scan) = next;
    }

    async fn fire(&self, post_id: &str, seq: u64) {
        {
            let mut timers = lock(&self.inner.timers);
            let id = job_id(post_id);
            if timers.get(&id).is_some_and(|t| t.seq == seq) {
                timers.remove(&id);
            }
        }

        let post = match self.inner.db.get_post(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                info!(post_id = %post_id, "Scheduled post was deleted, nothing to do");
                return;
            }
            Err(e) => {
                error!(post_id = %post_id, error = %e, "Could not load scheduled post");
                return;
            }
        };

        if post.status == PostStatus::Posted {
            debug!(post_id = %post_id, "Scheduled post already published");
            return;
        }

        match self
            .inner
            .publisher
            .publish_claimed(post_id, &PostStatus::PUBLISHABLE)
            .await
        {
            Ok(Some(report)) => {
                info!(post_id = %post_id, status = %report.post.status, "Scheduled post processed")
            }
            Ok(None) => debug!(post_id = %post_id, "Scheduled post claimed elsewhere"),
            Err(e) => error!(post_id = %post_id, error = %e, "Scheduled publish failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;
    use crate::poster::MultiPlatformPoster;
    use crate::types::{Platform, Post};
    use std::sync::atomic::AtomicUsize;

    async fn setup() -> (Arc<Database>, Scheduler, Arc<AtomicUsize>) {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        let twitter = MockPlatform::success(Platform::Twitter, "tw-1");
        let calls = twitter.call_counter();
        let poster = Arc::new(MultiPlatformPoster::new(vec![Arc::new(twitter)]));
        let publisher = Publisher::new(db.clone(), poster);
        let scheduler = Scheduler::new(db.clone(), publisher, Duration::from_secs(60));
        (db, scheduler, calls)
    }

    async fn stored(db: &Database, status: PostStatus, at: Option<DateTime<Utc>>) -> Post {
        let mut post = Post::new("Scheduled hello".to_string());
        post.platforms = vec![Platform::Twitter];
        post.status = status;
        post.scheduled_time = at;
        db.create_post(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_schedule_in_past_is_refused() {
        let (_db, scheduler, _) = setup().await;
        let past = Utc::now() - chrono::Duration::seconds(5);

        assert!(!scheduler.schedule_post("p1", past));
        assert!(!scheduler.is_scheduled("p1"));
        assert!(scheduler.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_timer() {
        let (_db, scheduler, _) = setup().await;
        let first = Utc::now() + chrono::Duration::hours(1);
        let second = Utc::now() + chrono::Duration::hours(2);

        assert!(scheduler.schedule_post("p1", first));
        assert!(scheduler.schedule_post("p1", second));

        let jobs = scheduler.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "post_p1");
        assert_eq!(jobs[0].next_run, Some(second));
    }

    #[tokio::test]
    async fn test_reschedule_into_past_drops_old_timer() {
        let (_db, scheduler, _) = setup().await;
        assert!(scheduler.schedule_post("p1", Utc::now() + chrono::Duration::hours(1)));
        assert!(!scheduler.schedule_post("p1", Utc::now() - chrono::Duration::hours(1)));
        assert!(!scheduler.is_scheduled("p1"));
    }

    #[tokio::test]
    async fn test_cancel() {
        let (_db, scheduler, _) = setup().await;
        scheduler.schedule_post("p1", Utc::now() + chrono::Duration::hours(1));
        assert!(scheduler.cancel("p1"));
        assert!(!scheduler.cancel("p1"));
    }

    #[tokio::test]
    async fn test_timer_fires_and_publishes() {
        let (db, scheduler, calls) = setup().await;
        let run_at = Utc::now() + chrono::Duration::milliseconds(100);
        let post = stored(&db, PostStatus::Scheduled, Some(run_at)).await;

        assert!(scheduler.schedule_post(&post.id, run_at));
        sleep(Duration::from_millis(500)).await;

        let post = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Posted);
        assert_eq!(post.posted_ids[&Platform::Twitter], "tw-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled(&post.id));
    }

    #[tokio::test]
    async fn test_timer_for_deleted_post_does_nothing() {
        let (db, scheduler, calls) = setup().await;
        let run_at = Utc::now() + chrono::Duration::milliseconds(100);
        let post = stored(&db, PostStatus::Scheduled, Some(run_at)).await;

        scheduler.schedule_post(&post.id, run_at);
        db.delete_post(&post.id).await.unwrap();
        sleep(Duration::from_millis(400)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timer_for_published_post_does_nothing() {
        let (db, scheduler, calls) = setup().await;
        let run_at = Utc::now() + chrono::Duration::milliseconds(100);
        let mut post = Post::new("Already out".to_string());
        post.platforms = vec![Platform::Twitter];
        post.status = PostStatus::Posted;
        post.posted_ids.insert(Platform::Twitter, "tw-0".to_string());
        post.scheduled_time = Some(run_at);
        db.create_post(&post).await.unwrap();

        assert!(scheduler.schedule_post(&post.id, run_at));
        sleep(Duration::from_millis(400)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_scheduled(&post.id));
        let post = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Posted);
        assert_eq!(post.posted_ids[&Platform::Twitter], "tw-0");
    }

    #[tokio::test]
    async fn test_scan_leaves_unclaimed_post_untouched_on_error() {
        let (db, scheduler, calls) = setup().await;
        let past = Utc::now() - chrono::Duration::minutes(1);
        let blocked = stored(&db, PostStatus::Scheduled, Some(past - chrono::Duration::minutes(1))).await;
        let ok = stored(&db, PostStatus::Scheduled, Some(past)).await;

        // the claim on `blocked` fails with a database error before taking effect
        let trigger = format!(
            "CREATE TRIGGER reject_claim BEFORE UPDATE OF status ON posts \
             WHEN NEW.status = 'publishing' AND OLD.id = '{}' \
             BEGIN SELECT RAISE(ABORT, 'claim rejected'); END",
            blocked.id
        );
        sqlx::query(&trigger).execute(db.pool()).await.unwrap();

        let summary = scheduler.process_due_posts().await.unwrap();
        assert_eq!(summary.due, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.posted, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let blocked = db.get_post(&blocked.id).await.unwrap().unwrap();
        assert_eq!(blocked.status, PostStatus::Scheduled);
        assert!(blocked.error_message.is_none());
        assert_eq!(db.get_post(&ok.id).await.unwrap().unwrap().status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_scan_publishes_due_and_skips_others() {
        let (db, scheduler, calls) = setup().await;
        let past = Utc::now() - chrono::Duration::minutes(1);
        let future = Utc::now() + chrono::Duration::hours(1);

        let due_scheduled = stored(&db, PostStatus::Scheduled, Some(past)).await;
        let due_approved = stored(&db, PostStatus::Approved, Some(past)).await;
        let draft = stored(&db, PostStatus::Draft, Some(past)).await;
        let later = stored(&db, PostStatus::Scheduled, Some(future)).await;

        let summary = scheduler.process_due_posts().await.unwrap();

        assert_eq!(summary.due, 2);
        assert_eq!(summary.posted, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        for id in [&due_scheduled.id, &due_approved.id] {
            assert_eq!(db.get_post(id).await.unwrap().unwrap().status, PostStatus::Posted);
        }
        assert_eq!(db.get_post(&draft.id).await.unwrap().unwrap().status, PostStatus::Draft);
        assert_eq!(
            db.get_post(&later.id).await.unwrap().unwrap().status,
            PostStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_scan_records_failure_and_continues() {
        let (db, scheduler, _) = setup().await;
        let past = Utc::now() - chrono::Duration::minutes(1);

        let mut empty = Post::new("No targets".to_string());
        empty.platforms = vec![];
        empty.status = PostStatus::Scheduled;
        empty.scheduled_time = Some(past - chrono::Duration::minutes(1));
        db.create_post(&empty).await.unwrap();
        let ok = stored(&db, PostStatus::Scheduled, Some(past)).await;

        let summary = scheduler.process_due_posts().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.posted, 1);

        let empty = db.get_post(&empty.id).await.unwrap().unwrap();
        assert_eq!(empty.status, PostStatus::Failed);
        assert_eq!(empty.error_message.as_deref(), Some("No platforms configured"));
        assert_eq!(db.get_post(&ok.id).await.unwrap().unwrap().status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_recover_fails_interrupted_and_restores_timers() {
        let (db, scheduler, _) = setup().await;
        let future = Utc::now() + chrono::Duration::hours(1);

        let stuck = stored(&db, PostStatus::Scheduled, None).await;
        db.claim_for_publish(&stuck.id, &PostStatus::PUBLISHABLE).await.unwrap();
        let upcoming = stored(&db, PostStatus::Scheduled, Some(future)).await;

        scheduler.recover().await.unwrap();

        let stuck = db.get_post(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, PostStatus::Failed);
        assert_eq!(stuck.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert!(scheduler.is_scheduled(&upcoming.id));
    }

    #[tokio::test]
    async fn test_start_lists_periodic_job_and_shutdown_clears() {
        let (_db, scheduler, _) = setup().await;
        scheduler.start().await.unwrap();
        scheduler.schedule_post("p1", Utc::now() + chrono::Duration::hours(1));

        let jobs = scheduler.jobs();
        assert_eq!(jobs[0].id, PERIODIC_JOB_ID);
        assert!(jobs[0].next_run.is_some());
        assert_eq!(jobs[1].id, "post_p1");

        scheduler.shutdown().await;
        assert!(scheduler.jobs().is_empty());
    }
}
