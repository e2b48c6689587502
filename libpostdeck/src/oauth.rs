//! OAuth connect flow for the publishing platforms
//!
//! 1. [`OAuthConnector::authorization_url`] issues a one-time CSRF `state`
//!    (plus a PKCE verifier for Twitter) and returns the provider URL.
//! 2. The provider redirects back with `code` and `state`;
//!    [`OAuthConnector::complete`] checks the state, exchanges the code and
//!    saves the resulting credentials.
//!
//! Facebook additionally swaps the short-lived user token for a long-lived one,
//! picks the first managed page and, when the page has a linked Instagram
//! business account, stores Instagram credentials too. Instagram has no flow
//! of its own.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::{CredentialStore, PlatformCredentials};
use crate::error::OAuthError;
use crate::platforms::facebook::id_string;
use crate::types::Platform;

/// Unused states are discarded after this long
const STATE_TTL: Duration = Duration::from_secs(600);

const LINKEDIN_SCOPES: &[&str] = &["openid", "profile", "w_member_social"];
const TWITTER_SCOPES: &[&str] = &["tweet.read", "tweet.write", "users.read", "offline.access"];
const FACEBOOK_SCOPES: &[&str] = &[
    "pages_manage_posts",
    "pages_read_engagement",
    "instagram_basic",
    "instagram_content_publish",
];

struct ClientSettings {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    scopes: &'static [&'static str],
}

struct PendingAuthorization {
    platform: Platform,
    code_verifier: Option<String>,
    issued_at: Instant,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

impl OAuthError {
    /// Short code used in the dashboard redirect (`?error=<code>`)
    pub fn redirect_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidState => "invalid_state",
            OAuthError::UnknownPlatform(_) | OAuthError::NotConfigured { .. } => "not_configured",
            OAuthError::TokenExchange(_) | OAuthError::Network(_) => "token_exchange_failed",
        }
    }
}

pub struct OAuthConnector {
    client: Client,
    config: Config,
    credentials: Arc<dyn CredentialStore>,
    pending: Mutex<HashMap<String, PendingAuthorization>>,
}

impl OAuthConnector {
    pub fn new(config: &Config, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: crate::platforms::http_client(),
            config: config.clone(),
            credentials,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn settings(&self, platform: Platform) -> Result<ClientSettings, OAuthError> {
        let (client_id, client_secret, env_var, auth_url, token_url, scopes) = match platform {
            Platform::LinkedIn => (
                &self.config.linkedin.client_id,
                &self.config.linkedin.client_secret,
                "LINKEDIN_CLIENT_ID",
                self.config.linkedin.auth_url.clone(),
                self.config.linkedin.token_url.clone(),
                LINKEDIN_SCOPES,
            ),
            Platform::Twitter => (
                &self.config.twitter.client_id,
                &self.config.twitter.client_secret,
                "TWITTER_CLIENT_ID",
                self.config.twitter.auth_url.clone(),
                self.config.twitter.token_url.clone(),
                TWITTER_SCOPES,
            ),
            Platform::Facebook => (
                &self.config.facebook.app_id,
                &self.config.facebook.app_secret,
                "FACEBOOK_APP_ID",
                self.config.facebook.auth_url.clone(),
                format!("{}/oauth/access_token", self.graph_url()),
                FACEBOOK_SCOPES,
            ),
            Platform::Instagram => {
                return Err(OAuthError::UnknownPlatform(
                    "instagram (connect facebook instead)".to_string(),
                ))
            }
        };

        let client_id = client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(OAuthError::NotConfigured { platform, env_var })?;

        Ok(ClientSettings {
            client_id,
            client_secret: client_secret.clone().unwrap_or_default(),
            auth_url,
            token_url,
            scopes,
        })
    }

    fn graph_url(&self) -> &str {
        self.config.facebook.graph_base_url.trim_end_matches('/')
    }

    fn callback_url(&self, platform: Platform) -> String {
        format!(
            "{}/api/auth/{}/callback",
            self.config.server.public_base_url.trim_end_matches('/'),
            platform
        )
    }

    /// Whether client credentials are configured; Instagram follows Facebook
    pub fn is_configured(&self, platform: Platform) -> bool {
        let platform = match platform {
            Platform::Instagram => Platform::Facebook,
            other => other,
        };
        self.settings(platform).is_ok()
    }

    /// Provider authorization URL with a fresh one-time state
    pub fn authorization_url(&self, platform: Platform) -> Result<String, OAuthError> {
        let settings = self.settings(platform)?;
        let state = random_token();
        let callback = self.callback_url(platform);
        let scope = settings.scopes.join(" ");

        let mut params = vec![
            ("client_id", settings.client_id.as_str()),
            ("redirect_uri", callback.as_str()),
            ("response_type", "code"),
            ("state", state.as_str()),
            ("scope", scope.as_str()),
        ];

        let code_verifier = (platform == Platform::Twitter).then(random_token);
        let challenge = code_verifier.as_deref().map(pkce_challenge);
        if let Some(challenge) = challenge.as_deref() {
            params.push(("code_challenge", challenge));
            params.push(("code_challenge_method", "S256"));
        }

        let url = url::Url::parse_with_params(&settings.auth_url, &params).map_err(|e| {
            OAuthError::TokenExchange(format!("invalid authorization URL: {}", e))
        })?;

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        pending.retain(|_, p| p.issued_at.elapsed() < STATE_TTL);
        pending.insert(
            state,
            PendingAuthorization {
                platform,
                code_verifier,
                issued_at: Instant::now(),
            },
        );

        Ok(url.to_string())
    }

    /// Consume a state issued for `platform`
    fn take_pending(&self, platform: Platform, state: &str) -> Result<PendingAuthorization, OAuthError> {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        match pending.remove(state) {
            Some(entry) if entry.platform == platform && entry.issued_at.elapsed() < STATE_TTL => {
                Ok(entry)
            }
            _ => Err(OAuthError::InvalidState),
        }
    }

    /// Finish the flow: verify state, exchange the code and store credentials
    pub async fn complete(&self, platform: Platform, code: &str, state: &str) -> Result<(), OAuthError> {
        let pending = self.take_pending(platform, state)?;
        let settings = self.settings(platform)?;
        let tokens = self
            .exchange_code(platform, &settings, code, pending.code_verifier.as_deref())
            .await?;

        match platform {
            Platform::Facebook => self.connect_facebook(&settings, tokens.access_token).await?,
            _ => {
                let credentials = PlatformCredentials::new(tokens.access_token)
                    .with_refresh_token(tokens.refresh_token);
                self.save(platform, credentials).await?;
            }
        }

        info!(platform = %platform, "Platform connected");
        Ok(())
    }

    async fn exchange_code(
        &self,
        platform: Platform,
        settings: &ClientSettings,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let callback = self.callback_url(platform);
        let mut form = vec![
            ("client_id", settings.client_id.as_str()),
            ("code", code),
            ("redirect_uri", callback.as_str()),
            ("grant_type", "authorization_code"),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        // Twitter authenticates the client with Basic auth instead of a form secret
        let request = if platform == Platform::Twitter {
            self.client
                .post(&settings.token_url)
                .basic_auth(&settings.client_id, Some(&settings.client_secret))
        } else {
            form.push(("client_secret", settings.client_secret.as_str()));
            self.client.post(&settings.token_url)
        };

        let response = request.form(&form).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let details: String = body.chars().take(100).collect();
            warn!(platform = %platform, details = %details, "Token exchange rejected");
            return Err(OAuthError::TokenExchange(details));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchange(format!("invalid token response: {}", e)))
    }

    async fn connect_facebook(&self, settings: &ClientSettings, user_token: String) -> Result<(), OAuthError> {
        let graph = self.graph_url().to_string();

        let long_lived: serde_json::Value = self
            .client
            .get(format!("{}/oauth/access_token", graph))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
                ("fb_exchange_token", user_token.as_str()),
            ])
            .send()
            .await?
            .json()
            .await
            .unwrap_or_default();
        let user_token = long_lived
            .get("access_token")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .unwrap_or(user_token);

        let pages: serde_json::Value = self
            .client
            .get(format!("{}/me/accounts", graph))
            .query(&[("access_token", user_token.as_str())])
            .send()
            .await?
            .json()
            .await
            .unwrap_or_default();

        let page = pages
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|pages| pages.first())
            .ok_or_else(|| OAuthError::TokenExchange("no Facebook page available".to_string()))?;

        let page_id = page.get("id").and_then(id_string).ok_or_else(|| {
            OAuthError::TokenExchange("Facebook page missing id".to_string())
        })?;
        let page_token = page
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| OAuthError::TokenExchange("Facebook page missing token".to_string()))?
            .to_string();
        let page_name = page.get("name").and_then(|n| n.as_str()).map(str::to_string);

        self.save(
            Platform::Facebook,
            PlatformCredentials::new(page_token.clone()).with_page(page_id.clone(), page_name),
        )
        .await?;

        let linked: serde_json::Value = self
            .client
            .get(format!("{}/{}", graph, page_id))
            .query(&[
                ("fields", "instagram_business_account"),
                ("access_token", page_token.as_str()),
            ])
            .send()
            .await?
            .json()
            .await
            .unwrap_or_default();

        if let Some(account_id) = linked.pointer("/instagram_business_account/id").and_then(id_string) {
            self.save(
                Platform::Instagram,
                PlatformCredentials::new(page_token).with_account(account_id),
            )
            .await?;
            info!("Instagram business account connected through Facebook page");
        }

        Ok(())
    }

    async fn save(&self, platform: Platform, credentials: PlatformCredentials) -> Result<(), OAuthError> {
        self.credentials
            .save(platform, credentials)
            .await
            .map_err(|e| OAuthError::TokenExchange(format!("failed to store credentials: {}", e)))
    }

    /// Forget stored credentials for a platform
    pub async fn disconnect(&self, platform: Platform) -> crate::error::Result<bool> {
        self.credentials.remove(platform).await
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 PKCE challenge for a verifier
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
