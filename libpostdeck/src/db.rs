//! Database operations for Postdeck

use chrono::{DateTime, TimeZone, Utc};
use secrecy::ExposeSecret;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::credentials::PlatformCredentials;
use crate::error::{DbError, Result};
use crate::poster::PublishOutcome;
use crate::types::{ContentType, Platform, Post, PostFilter, PostStatus, PostedIds};

const POST_COLUMNS: &str = "id, content, image_url, image_prompt, content_type, topic, \
    word_count, status, auto_post, scheduled_time, platforms, posted_ids, posted_time, \
    error_message, created_at, updated_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the file on first open
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, content, image_url, image_prompt, content_type, topic,
                word_count, status, auto_post, scheduled_time, platforms, posted_ids,
                posted_time, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(&post.image_prompt)
        .bind(post.content_type.as_str())
        .bind(&post.topic)
        .bind(post.word_count)
        .bind(post.status.as_str())
        .bind(post.auto_post)
        .bind(post.scheduled_time.map(to_millis))
        .bind(encode_json(&post.platforms)?)
        .bind(encode_json(&post.posted_ids)?)
        .bind(post.posted_time.map(to_millis))
        .bind(&post.error_message)
        .bind(to_millis(post.created_at))
        .bind(to_millis(post.updated_at))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let query = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(row_to_post).transpose()
    }

    /// Posts matching the filter, newest first, plus the unpaginated total
    pub async fn list_posts(&self, filter: &PostFilter) -> Result<(Vec<Post>, i64)> {
        let mut where_clauses = vec!["1=1"];
        if filter.status.is_some() {
            where_clauses.push("status = ?");
        }
        if filter.content_type.is_some() {
            where_clauses.push("content_type = ?");
        }
        let where_clause = where_clauses.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM posts WHERE {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(content_type) = filter.content_type {
            count_query = count_query.bind(content_type.as_str());
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let list_sql = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            POST_COLUMNS, where_clause
        );
        let mut query = sqlx::query(&list_sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(content_type) = filter.content_type {
            query = query.bind(content_type.as_str());
        }
        let rows = query
            .bind(filter.limit as i64)
            .bind(filter.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        let posts = rows.iter().map(row_to_post).collect::<Result<Vec<_>>>()?;
        Ok((posts, total))
    }

    /// Write every editable field of `post` and refresh `updated_at`.
    ///
    /// The write only lands while the stored status is still `expected`, so an
    /// edit based on a stale read cannot undo a publish claim. Returns false
    /// when the post is missing or its status has moved on.
    pub async fn update_post(&self, post: &Post, expected: PostStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET content = ?, image_url = ?, image_prompt = ?, content_type = ?,
                topic = ?, word_count = ?, status = ?, auto_post = ?, scheduled_time = ?,
                platforms = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(&post.image_prompt)
        .bind(post.content_type.as_str())
        .bind(&post.topic)
        .bind(post.word_count)
        .bind(post.status.as_str())
        .bind(post.auto_post)
        .bind(post.scheduled_time.map(to_millis))
        .bind(encode_json(&post.platforms)?)
        .bind(now_millis())
        .bind(&post.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Set a post's status if its current status is in `allowed`.
    ///
    /// Check and write happen in one statement; returns whether it took effect.
    pub async fn transition_status(
        &self,
        post_id: &str,
        allowed: &[PostStatus],
        status: PostStatus,
    ) -> Result<bool> {
        if allowed.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            "UPDATE posts SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(now_millis())
            .bind(post_id);
        for allowed_status in allowed {
            query = query.bind(allowed_status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(DbError::SqlxError)?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a post into `publishing` if its current status is in `allowed`.
    ///
    /// Returns true only for the single caller whose update took effect.
    pub async fn claim_for_publish(&self, post_id: &str, allowed: &[PostStatus]) -> Result<bool> {
        self.transition_status(post_id, allowed, PostStatus::Publishing)
            .await
    }

    /// Persist an aggregate publish outcome.
    ///
    /// `posted_time` is only set the first time a post reaches `posted`.
    pub async fn record_publish_outcome(
        &self,
        post_id: &str,
        outcome: &PublishOutcome,
    ) -> Result<bool> {
        let now = now_millis();
        let posted_time = (outcome.status == PostStatus::Posted).then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE posts SET status = ?, posted_ids = ?, error_message = ?,
                posted_time = COALESCE(posted_time, ?), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(outcome.status.as_str())
        .bind(encode_json(&outcome.posted_ids)?)
        .bind(&outcome.error_message)
        .bind(posted_time)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark a post failed without touching its posted ids
    pub async fn mark_failed(&self, post_id: &str, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE posts SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(PostStatus::Failed.as_str())
        .bind(error_message)
        .bind(now_millis())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Posts in a due status whose scheduled time is at or before `now`
    pub async fn due_posts(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        self.scheduled_posts("scheduled_time <= ?", now).await
    }

    /// Posts in a due status scheduled strictly after `now`
    pub async fn future_scheduled_posts(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        self.scheduled_posts("scheduled_time > ?", now).await
    }

    async fn scheduled_posts(&self, time_clause: &str, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let placeholders = vec!["?"; PostStatus::DUE.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM posts WHERE status IN ({}) AND scheduled_time IS NOT NULL AND {} \
             ORDER BY scheduled_time ASC",
            POST_COLUMNS, placeholders, time_clause
        );

        let mut query = sqlx::query(&sql);
        for status in PostStatus::DUE {
            query = query.bind(status.as_str());
        }
        let rows = query
            .bind(to_millis(now))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(row_to_post).collect()
    }

    /// Fail every post left in `publishing`; returns the number of posts changed
    pub async fn fail_interrupted(&self, error_message: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE posts SET status = ?, error_message = ?, updated_at = ? WHERE status = ?",
        )
        .bind(PostStatus::Failed.as_str())
        .bind(error_message)
        .bind(now_millis())
        .bind(PostStatus::Publishing.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    pub async fn save_credentials(
        &self,
        platform: Platform,
        credentials: &PlatformCredentials,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_credentials
                (platform, access_token, refresh_token, page_id, page_name, account_id,
                 connected, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                page_id = excluded.page_id,
                page_name = excluded.page_name,
                account_id = excluded.account_id,
                connected = excluded.connected,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(platform.as_str())
        .bind(credentials.access_token.expose_secret())
        .bind(
            credentials
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
        )
        .bind(&credentials.page_id)
        .bind(&credentials.page_name)
        .bind(&credentials.account_id)
        .bind(credentials.connected)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_credentials(&self, platform: Platform) -> Result<Option<PlatformCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT access_token, refresh_token, page_id, page_name, account_id, connected
            FROM platform_credentials WHERE platform = ?
            "#,
        )
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token: String = row.try_get("access_token").map_err(DbError::SqlxError)?;
        let refresh_token: Option<String> =
            row.try_get("refresh_token").map_err(DbError::SqlxError)?;
        let mut credentials =
            PlatformCredentials::new(access_token).with_refresh_token(refresh_token);
        credentials.page_id = row.try_get("page_id").map_err(DbError::SqlxError)?;
        credentials.page_name = row.try_get("page_name").map_err(DbError::SqlxError)?;
        credentials.account_id = row.try_get("account_id").map_err(DbError::SqlxError)?;
        credentials.connected = row.try_get("connected").map_err(DbError::SqlxError)?;

        Ok(Some(credentials))
    }

    pub async fn delete_credentials(&self, platform: Platform) -> Result<bool> {
        let result = sqlx::query("DELETE FROM platform_credentials WHERE platform = ?")
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn now_millis() -> i64 {
    to_millis(Utc::now())
}

fn from_millis(column: &'static str, millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        DbError::Decode {
            column,
            message: format!("timestamp out of range: {}", millis),
        }
        .into()
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        DbError::Decode {
            column: "json",
            message: e.to_string(),
        }
        .into()
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(column: &'static str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        DbError::Decode {
            column,
            message: e.to_string(),
        }
        .into()
    })
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let get_str = |column: &'static str| -> Result<String> {
        row.try_get::<String, _>(column)
            .map_err(|e| DbError::SqlxError(e).into())
    };
    let get_opt_str = |column: &'static str| -> Result<Option<String>> {
        row.try_get::<Option<String>, _>(column)
            .map_err(|e| DbError::SqlxError(e).into())
    };
    let get_opt_time = |column: &'static str| -> Result<Option<DateTime<Utc>>> {
        row.try_get::<Option<i64>, _>(column)
            .map_err(DbError::SqlxError)?
            .map(|ms| from_millis(column, ms))
            .transpose()
    };
    let get_time = |column: &'static str| -> Result<DateTime<Utc>> {
        let ms = row.try_get::<i64, _>(column).map_err(DbError::SqlxError)?;
        from_millis(column, ms)
    };

    let status = get_str("status")?
        .parse::<PostStatus>()
        .map_err(|e| DbError::Decode {
            column: "status",
            message: e.to_string(),
        })?;
    let content_type = get_str("content_type")?
        .parse::<ContentType>()
        .map_err(|e| DbError::Decode {
            column: "content_type",
            message: e.to_string(),
        })?;
    let platforms: Vec<Platform> = decode_json("platforms", &get_str("platforms")?)?;
    let posted_ids: PostedIds = decode_json("posted_ids", &get_str("posted_ids")?)?;

    Ok(Post {
        id: get_str("id")?,
        content: get_str("content")?,
        image_url: get_opt_str("image_url")?,
        image_prompt: get_opt_str("image_prompt")?,
        content_type,
        topic: get_opt_str("topic")?,
        word_count: row.try_get("word_count").map_err(DbError::SqlxError)?,
        status,
        auto_post: row.try_get("auto_post").map_err(DbError::SqlxError)?,
        scheduled_time: get_opt_time("scheduled_time")?,
        platforms,
        posted_ids,
        posted_time: get_opt_time("posted_time")?,
        error_message: get_opt_str("error_message")?,
        created_at: get_time("created_at")?,
        updated_at: get_time("updated_at")?,
    })
}
