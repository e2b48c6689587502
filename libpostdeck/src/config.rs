//! Configuration management for Postdeck
//!
//! Configuration is read from a TOML file and then overlaid with environment
//! variables, so deployments can keep secrets out of the file entirely.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub linkedin: LinkedInConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub facebook: FacebookConfig,
    #[serde(default)]
    pub instagram: InstagramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Dashboard origin; allowed by CORS and used for OAuth redirects
    pub frontend_url: String,
    /// Externally reachable base URL of this API, used for OAuth callbacks
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/postdeck/posts.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the due-post scan runs, in humantime format ("60s", "1m")
    pub poll_interval: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: "60s".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Result<Duration> {
        let interval = humantime::parse_duration(&self.poll_interval).map_err(|e| {
            ConfigError::InvalidValue {
                field: "scheduler.poll_interval".to_string(),
                message: e.to_string(),
            }
        })?;

        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_interval".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub image_model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o".to_string(),
            image_model: "dall-e-3".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.85,
            max_tokens: 1500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkedInConfig {
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            client_id: None,
            client_secret: None,
            api_base_url: "https://api.linkedin.com".to_string(),
            auth_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    /// OAuth 2.0 user-context bearer token
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Directory local images may be uploaded from; unset disables local media
    pub media_dir: Option<String>,
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            client_id: None,
            client_secret: None,
            media_dir: None,
            api_base_url: "https://api.twitter.com".to_string(),
            auth_url: "https://twitter.com/i/oauth2/authorize".to_string(),
            token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    pub page_access_token: Option<String>,
    pub page_id: Option<String>,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    /// Graph API root including the version segment
    pub graph_base_url: String,
    pub auth_url: String,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            page_access_token: None,
            page_id: None,
            app_id: None,
            app_secret: None,
            graph_base_url: "https://graph.facebook.com/v18.0".to_string(),
            auth_url: "https://www.facebook.com/v18.0/dialog/oauth".to_string(),
        }
    }
}

/// Instagram publishes through the Facebook Graph API with the page token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstagramConfig {
    pub account_id: Option<String>,
}

impl Config {
    /// Load configuration from the default location, then apply environment overrides
    ///
    /// A missing config file is not an error; the defaults are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Overlay values from the environment; `lookup` returns `None` for unset keys
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("FRONTEND_URL") {
            self.server.frontend_url = v;
        }
        if let Some(v) = get("PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.openai.model = v;
        }

        if let Some(v) = get("LINKEDIN_ACCESS_TOKEN") {
            self.linkedin.access_token = Some(v);
        }
        if let Some(v) = get("LINKEDIN_CLIENT_ID") {
            self.linkedin.client_id = Some(v);
        }
        if let Some(v) = get("LINKEDIN_CLIENT_SECRET") {
            self.linkedin.client_secret = Some(v);
        }

        if let Some(v) = get("TWITTER_ACCESS_TOKEN") {
            self.twitter.access_token = Some(v);
        }
        if let Some(v) = get("TWITTER_CLIENT_ID") {
            self.twitter.client_id = Some(v);
        }
        if let Some(v) = get("TWITTER_CLIENT_SECRET") {
            self.twitter.client_secret = Some(v);
        }
        if let Some(v) = get("TWITTER_MEDIA_DIR") {
            self.twitter.media_dir = Some(v);
        }

        if let Some(v) = get("FACEBOOK_PAGE_ACCESS_TOKEN") {
            self.facebook.page_access_token = Some(v);
        }
        if let Some(v) = get("FACEBOOK_PAGE_ID") {
            self.facebook.page_id = Some(v);
        }
        if let Some(v) = get("FACEBOOK_APP_ID") {
            self.facebook.app_id = Some(v);
        }
        if let Some(v) = get("FACEBOOK_APP_SECRET") {
            self.facebook.app_secret = Some(v);
        }

        if let Some(v) = get("INSTAGRAM_ACCOUNT_ID") {
            self.instagram.account_id = Some(v);
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POSTDECK_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("postdeck").join("config.toml"))
}

/// Expand `~` in the configured database path
pub fn resolve_db_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
