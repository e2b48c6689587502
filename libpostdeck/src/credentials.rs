//! Per-platform credential storage
//!
//! Adapters never hold tokens themselves. They ask a [`CredentialStore`] on every
//! call, so an OAuth connect or disconnect takes effect immediately.
//!
//! Two backends exist:
//! - [`DatabaseStore`]: tokens saved by the OAuth flow, persisted in SQLite
//! - [`MemoryStore`]: tokens supplied through configuration or the environment
//!
//! [`CredentialManager`] layers them, consulting each backend in priority order.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::types::Platform;

/// Credential blob for one platform
#[derive(Clone)]
pub struct PlatformCredentials {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Facebook page the token publishes to
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    /// Instagram business account id
    pub account_id: Option<String>,
    pub connected: bool,
}

impl PlatformCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            page_id: None,
            page_name: None,
            account_id: None,
            connected: true,
        }
    }

    pub fn with_page(mut self, page_id: impl Into<String>, page_name: Option<String>) -> Self {
        self.page_id = Some(page_id.into());
        self.page_name = page_name;
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token.map(SecretString::from);
        self
    }
}

impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("access_token", &"[REDACTED]")
            .field("page_id", &self.page_id)
            .field("page_name", &self.page_name)
            .field("account_id", &self.account_id)
            .field("connected", &self.connected)
            .finish()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials for a platform, or `None` when nothing is stored
    async fn load(&self, platform: Platform) -> Result<Option<PlatformCredentials>>;

    async fn save(&self, platform: Platform, credentials: PlatformCredentials) -> Result<()>;

    /// Remove stored credentials; returns whether anything was removed
    async fn remove(&self, platform: Platform) -> Result<bool>;

    /// Backend name used in log output
    fn backend_name(&self) -> &str;
}

/// Credentials persisted in the `platform_credentials` table
pub struct DatabaseStore {
    db: Arc<Database>,
}

impl DatabaseStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for DatabaseStore {
    async fn load(&self, platform: Platform) -> Result<Option<PlatformCredentials>> {
        self.db.get_credentials(platform).await
    }

    async fn save(&self, platform: Platform, credentials: PlatformCredentials) -> Result<()> {
        self.db.save_credentials(platform, &credentials).await
    }

    async fn remove(&self, platform: Platform) -> Result<bool> {
        self.db.delete_credentials(platform).await
    }

    fn backend_name(&self) -> &str {
        "database"
    }
}

/// In-process credentials, seeded from configuration
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Platform, PlatformCredentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from configured tokens.
    ///
    /// Facebook needs a page id next to its token. Instagram reuses the Facebook
    /// page token together with the Instagram account id.
    pub fn from_config(config: &Config) -> Self {
        let mut entries = HashMap::new();

        if let Some(token) = &config.linkedin.access_token {
            entries.insert(Platform::LinkedIn, PlatformCredentials::new(token.clone()));
        }

        if let Some(token) = &config.twitter.access_token {
            entries.insert(Platform::Twitter, PlatformCredentials::new(token.clone()));
        }

        if let (Some(token), Some(page_id)) =
            (&config.facebook.page_access_token, &config.facebook.page_id)
        {
            entries.insert(
                Platform::Facebook,
                PlatformCredentials::new(token.clone()).with_page(page_id.clone(), None),
            );
        }

        if let (Some(token), Some(account_id)) =
            (&config.facebook.page_access_token, &config.instagram.account_id)
        {
            entries.insert(
                Platform::Instagram,
                PlatformCredentials::new(token.clone()).with_account(account_id.clone()),
            );
        }

        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self, platform: Platform) -> Result<Option<PlatformCredentials>> {
        Ok(self.entries.read().await.get(&platform).cloned())
    }

    async fn save(&self, platform: Platform, credentials: PlatformCredentials) -> Result<()> {
        self.entries.write().await.insert(platform, credentials);
        Ok(())
    }

    async fn remove(&self, platform: Platform) -> Result<bool> {
        Ok(self.entries.write().await.remove(&platform).is_some())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Layered credential lookup.
///
/// Loads return the first connected entry found in priority order. Saves go to
/// the primary backend. Removes apply to every backend so a disconnect is not
/// undone by a lower-priority entry.
pub struct CredentialManager {
    stores: Vec<Arc<dyn CredentialStore>>,
}

impl CredentialManager {
    pub fn new(stores: Vec<Arc<dyn CredentialStore>>) -> Self {
        Self { stores }
    }

    /// OAuth-saved tokens first, configured tokens second
    pub fn with_database(db: Arc<Database>, config: &Config) -> Self {
        Self::new(vec![
            Arc::new(DatabaseStore::new(db)),
            Arc::new(MemoryStore::from_config(config)),
        ])
    }

    pub fn backends(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.backend_name()).collect()
    }
}

#[async_trait]
impl CredentialStore for CredentialManager {
    async fn load(&self, platform: Platform) -> Result<Option<PlatformCredentials>> {
        for store in &self.stores {
            if let Some(credentials) = store.load(platform).await? {
                if credentials.connected {
                    tracing::debug!(
                        platform = %platform,
                        backend = store.backend_name(),
                        "Loaded credentials"
                    );
                    return Ok(Some(credentials));
                }
            }
        }
        Ok(None)
    }

    async fn save(&self, platform: Platform, credentials: PlatformCredentials) -> Result<()> {
        match self.stores.first() {
            Some(store) => {
                store.save(platform, credentials).await?;
                tracing::info!(
                    platform = %platform,
                    backend = store.backend_name(),
                    "Saved credentials"
                );
                Ok(())
            }
            None => Err(crate::error::PostdeckError::InvalidInput(
                "no credential backend available".to_string(),
            )),
        }
    }

    async fn remove(&self, platform: Platform) -> Result<bool> {
        let mut removed = false;
        for store in &self.stores {
            removed |= store.remove(platform).await?;
        }
        if removed {
            tracing::info!(platform = %platform, "Removed credentials");
        }
        Ok(removed)
    }

    fn backend_name(&self) -> &str {
        "layered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn config_with_tokens() -> Config {
        let mut config = Config::default();
        config.linkedin.access_token = Some("li-token".to_string());
        config.facebook.page_access_token = Some("fb-token".to_string());
        config.facebook.page_id = Some("page-1".to_string());
        config.instagram.account_id = Some("ig-1".to_string());
        config
    }

    #[tokio::test]
    async fn test_memory_store_seeds_from_config() {
        let store = MemoryStore::from_config(&config_with_tokens());

        let linkedin = store.load(Platform::LinkedIn).await.unwrap().unwrap();
        assert_eq!(linkedin.access_token.expose_secret(), "li-token");

        let facebook = store.load(Platform::Facebook).await.unwrap().unwrap();
        assert_eq!(facebook.page_id.as_deref(), Some("page-1"));

        let instagram = store.load(Platform::Instagram).await.unwrap().unwrap();
        assert_eq!(instagram.access_token.expose_secret(), "fb-token");
        assert_eq!(instagram.account_id.as_deref(), Some("ig-1"));

        assert!(store.load(Platform::Twitter).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_facebook_token_without_page_is_not_seeded() {
        let mut config = Config::default();
        config.facebook.page_access_token = Some("fb-token".to_string());
        let store = MemoryStore::from_config(&config);

        assert!(store.load(Platform::Facebook).await.unwrap().is_none());
        assert!(store.load(Platform::Instagram).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manager_prefers_first_store() {
        let primary = Arc::new(MemoryStore::new());
        let fallback = Arc::new(MemoryStore::new());
        primary
            .save(Platform::Twitter, PlatformCredentials::new("oauth"))
            .await
            .unwrap();
        fallback
            .save(Platform::Twitter, PlatformCredentials::new("env"))
            .await
            .unwrap();
        fallback
            .save(Platform::LinkedIn, PlatformCredentials::new("env-li"))
            .await
            .unwrap();

        let manager = CredentialManager::new(vec![primary, fallback]);

        let twitter = manager.load(Platform::Twitter).await.unwrap().unwrap();
        assert_eq!(twitter.access_token.expose_secret(), "oauth");

        let linkedin = manager.load(Platform::LinkedIn).await.unwrap().unwrap();
        assert_eq!(linkedin.access_token.expose_secret(), "env-li");
    }

    #[tokio::test]
    async fn test_manager_skips_disconnected_entries() {
        let primary = Arc::new(MemoryStore::new());
        let mut stale = PlatformCredentials::new("old");
        stale.connected = false;
        primary.save(Platform::LinkedIn, stale).await.unwrap();

        let manager = CredentialManager::new(vec![primary]);
        assert!(manager.load(Platform::LinkedIn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manager_remove_clears_every_backend() {
        let primary = Arc::new(MemoryStore::new());
        let fallback = Arc::new(MemoryStore::new());
        primary
            .save(Platform::LinkedIn, PlatformCredentials::new("a"))
            .await
            .unwrap();
        fallback
            .save(Platform::LinkedIn, PlatformCredentials::new("b"))
            .await
            .unwrap();

        let manager = CredentialManager::new(vec![primary, fallback]);
        assert!(manager.remove(Platform::LinkedIn).await.unwrap());
        assert!(manager.load(Platform::LinkedIn).await.unwrap().is_none());
        assert!(!manager.remove(Platform::LinkedIn).await.unwrap());
    }

    #[test]
    fn test_debug_redacts_token() {
        let credentials = PlatformCredentials::new("super-secret");
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
