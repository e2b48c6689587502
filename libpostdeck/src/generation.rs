//! Post text and image generation through the OpenAI API

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::OpenAiConfig;
use crate::error::GenerationError;
use crate::types::{ContentType, Platform};

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub content_type: ContentType,
    pub topic: Option<String>,
    pub platforms: Vec<Platform>,
    /// Replaces the topic-derived user prompt when present
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedContent {
    pub content: String,
    pub image_prompt: String,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub image_url: String,
    pub revised_prompt: Option<String>,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError>;

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, GenerationError>;

    /// False when no API key is available
    fn is_configured(&self) -> bool;
}

pub struct OpenAiGenerator {
    client: Client,
    api_key: Option<SecretString>,
    config: OpenAiConfig,
}

impl OpenAiGenerator {
    pub fn new(config: &OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build OpenAI client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            api_key: config
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            config: config.clone(),
        }
    }

    fn api_key(&self) -> Result<&SecretString, GenerationError> {
        self.api_key.as_ref().ok_or(GenerationError::NotConfigured)
    }

    async fn call_api<T: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R, GenerationError> {
        let api_key = self.api_key()?;
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidFormat(e.to_string()))
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(request.content_type, &request.platforms),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(request),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response: ChatCompletionResponse = self.call_api("chat/completions", &body).await?;
        let raw = response
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect::<String>();
        let raw = raw.trim();

        if raw.is_empty() {
            return Err(GenerationError::InvalidFormat("Empty response".to_string()));
        }

        tracing::debug!(
            content_type = %request.content_type,
            chars = raw.len(),
            "Received generated content"
        );
        Ok(parse_generated(raw))
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let body = ImageRequest {
            model: &self.config.image_model,
            prompt,
            size: "1024x1024",
            quality: "standard",
            n: 1,
        };

        let response: ImageResponse = self.call_api("images/generations", &body).await?;
        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::InvalidFormat("No image returned".to_string()))?;
        let image_url = image
            .url
            .ok_or_else(|| GenerationError::InvalidFormat("Image response missing url".to_string()))?;

        Ok(GeneratedImage {
            image_url,
            revised_prompt: image.revised_prompt,
        })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

const OUTPUT_CONTRACT: &str = r#"Respond with JSON only, in this shape:
{"content": "<the full post, hashtags included>", "image_prompt": "<short description of a matching image>", "hashtags": ["tag1", "tag2"]}"#;

fn system_prompt(content_type: ContentType, platforms: &[Platform]) -> String {
    let platforms = if platforms.is_empty() {
        Platform::LinkedIn.to_string()
    } else {
        platforms
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let guidance = match content_type {
        ContentType::Educational => {
            "Write an educational post. Open with a hook under 50 characters, \
             follow with one line on what the reader will learn, then 5-7 short \
             bullet points with concrete numbers or examples, one takeaway line, \
             and a question or call to save. 80-150 words, at most 2 emojis, \
             10-15 hashtags, one idea per line."
        }
        ContentType::Motivation => {
            "Write a short motivational post. Either a bold statement expanded in \
             2-3 personal sentences with a one-line takeaway, or a numbered list of \
             three lessons ending with a question. 40-80 words, no corporate \
             language, at most 2 emojis, 10 or more hashtags at the end."
        }
        _ => {
            "Write an engaging post for professionals and founders. Be specific, \
             share a real opinion or insight, give a clear takeaway and end with a \
             question or call to action. 50-150 words with 10-15 hashtags."
        }
    };

    format!(
        "You are a tech founder writing social media content for: {}.\n\n{}\n\n{}",
        platforms, guidance, OUTPUT_CONTRACT
    )
}

fn user_prompt(request: &GenerationRequest) -> String {
    if let Some(custom) = request.custom_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        return custom.to_string();
    }
    match request.topic.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(topic) => format!("Create a post about: {}", topic),
        None => "Create an engaging post based on your expertise.".to_string(),
    }
}

#[derive(Deserialize, Default)]
struct LooseGenerated {
    content: Option<String>,
    image_prompt: Option<String>,
    hashtags: Option<Vec<String>>,
}

/// Interpret a model reply.
///
/// Accepts bare JSON, JSON wrapped in a ```json fence, or JSON surrounded by
/// prose. Anything unparseable becomes the post content verbatim.
pub fn parse_generated(raw: &str) -> GeneratedContent {
    let trimmed = raw.trim();
    let unfenced = strip_code_fence(trimmed);

    let parsed = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<LooseGenerated>(&unfenced[start..=end]).ok()
        }
        _ => None,
    }
    .unwrap_or_default();

    GeneratedContent {
        content: parsed.content.unwrap_or_else(|| trimmed.to_string()),
        image_prompt: parsed.image_prompt.unwrap_or_default(),
        hashtags: parsed.hashtags.unwrap_or_default(),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw;
    if text.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("```json")) {
        text = text[7..].trim_start();
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start();
    }
    text.strip_suffix("```").unwrap_or(text).trim_end()
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'static str,
    quality: &'static str,
    n: u32,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}
