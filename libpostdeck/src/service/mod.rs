//! Service layer for Postdeck
//!
//! `PostdeckService` owns the shared state (database, credential store, platform
//! adapters, content generator) and hands out the specialized services built on
//! it:
//!
//! - `PostService`: generation, creation, edits, approval, deletion
//! - `Publisher`: claim-guarded publishing of stored posts
//! - `Scheduler`: periodic due-post scan and per-post timers
//! - `OAuthConnector`: platform account connection
//!
//! # Example
//!
//! ```no_run
//! use libpostdeck::service::PostdeckService;
//! use libpostdeck::service::posts::CreatePostRequest;
//!
//! # async fn example() -> libpostdeck::Result<()> {
//! let service = PostdeckService::new().await?;
//! service.scheduler().start().await?;
//!
//! let post = service.posts().create(CreatePostRequest::new("Hello!")).await?;
//! let report = service.publisher().publish(&post.id).await?;
//! println!("posted: {}", report.all_success);
//! # Ok(())
//! # }
//! ```

pub mod posts;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use self::posts::PostService;
use crate::config::{resolve_db_path, Config};
use crate::credentials::{CredentialManager, CredentialStore};
use crate::db::Database;
use crate::error::{ConfigError, Result};
use crate::generation::{ContentGenerator, OpenAiGenerator};
use crate::oauth::OAuthConnector;
use crate::poster::MultiPlatformPoster;
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use crate::types::Platform;

/// Connection state of one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformConnection {
    pub connected: bool,
    /// OAuth client credentials are present, so a connect flow can start
    pub oauth_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub connected: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatus {
    pub platforms: BTreeMap<Platform, PlatformConnection>,
    pub openai_configured: bool,
    pub summary: ConnectionSummary,
}

/// Everything a service needs that tests may want to substitute
pub struct ServiceParts {
    pub config: Config,
    pub db: Arc<Database>,
    pub credentials: Arc<dyn CredentialStore>,
    pub poster: Arc<MultiPlatformPoster>,
    pub generator: Arc<dyn ContentGenerator>,
}

/// Main service facade
pub struct PostdeckService {
    config: Arc<Config>,
    db: Arc<Database>,
    credentials: Arc<dyn CredentialStore>,
    generator: Arc<dyn ContentGenerator>,
    posts: PostService,
    publisher: Publisher,
    scheduler: Scheduler,
    oauth: Arc<OAuthConnector>,
}

impl PostdeckService {
    /// Create a service from the default configuration location
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Open the configured database and wire the network adapters.
    ///
    /// Credentials saved by OAuth take precedence over tokens from the
    /// configuration.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db_path = resolve_db_path(&config.database.path);
        let db_path_str = db_path.to_str().ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "database.path".to_string(),
                message: "path is not valid UTF-8".to_string(),
            }
        })?;
        let db = Arc::new(Database::new(db_path_str).await?);

        let credentials: Arc<dyn CredentialStore> =
            Arc::new(CredentialManager::with_database(db.clone(), &config));
        let poster = Arc::new(MultiPlatformPoster::from_config(&config, credentials.clone()));
        let generator: Arc<dyn ContentGenerator> = Arc::new(OpenAiGenerator::new(&config.openai));

        Self::from_parts(ServiceParts {
            config,
            db,
            credentials,
            poster,
            generator,
        })
    }

    pub fn from_parts(parts: ServiceParts) -> Result<Self> {
        let ServiceParts {
            config,
            db,
            credentials,
            poster,
            generator,
        } = parts;

        let poll_interval = config.scheduler.poll_interval()?;
        let publisher = Publisher::new(db.clone(), poster);
        let scheduler = Scheduler::new(db.clone(), publisher.clone(), poll_interval);
        let posts = PostService::new(db.clone(), scheduler.clone(), generator.clone());
        let oauth = Arc::new(OAuthConnector::new(&config, credentials.clone()));

        Ok(Self {
            config: Arc::new(config),
            db,
            credentials,
            generator,
            posts,
            publisher,
            scheduler,
            oauth,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn oauth(&self) -> &OAuthConnector {
        &self.oauth
    }

    /// Which platforms hold usable credentials and which can start OAuth
    pub async fn platform_status(&self) -> Result<PlatformStatus> {
        let enabled = self.publisher.poster().enabled_platforms().await;
        let mut platforms = BTreeMap::new();

        for platform in Platform::ALL {
            let page_name = match platform {
                Platform::Facebook => self
                    .credentials
                    .load(platform)
                    .await?
                    .and_then(|c| c.page_name),
                _ => None,
            };
            platforms.insert(
                platform,
                PlatformConnection {
                    connected: enabled.get(&platform).copied().unwrap_or(false),
                    oauth_configured: self.oauth.is_configured(platform),
                    page_name,
                },
            );
        }

        let summary = ConnectionSummary {
            connected: platforms.values().filter(|p| p.connected).count(),
            total: platforms.len(),
        };
        Ok(PlatformStatus {
            platforms,
            openai_configured: self.generator.is_configured(),
            summary,
        })
    }
}
