use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::Json;
use libpostdeck::poster::PublishResults;
use libpostdeck::scheduler::JobInfo;
use libpostdeck::service::posts::{CreatePostRequest, GeneratePostRequest};
use libpostdeck::service::PlatformStatus;
use libpostdeck::{ContentType, Platform, Post, PostFilter, PostStatus, PostUpdate};
use serde::{Deserialize, Serialize};

use crate::http::extract::{ApiJson, ApiQuery};
use crate::http::AppError;
use crate::AppState;

fn parse_platform(raw: &str) -> Result<Platform, AppError> {
    raw.parse::<Platform>().map_err(AppError::from)
}

#[derive(Serialize)]
pub struct RootResponse {
    message: &'static str,
    status: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Postdeck API",
        status: "running",
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

pub async fn platform_status(State(state): State<AppState>) -> Result<Json<PlatformStatus>, AppError> {
    Ok(Json(state.service.platform_status().await?))
}

#[derive(Serialize)]
pub struct JobsResponse {
    jobs: Vec<JobInfo>,
    total: usize,
}

pub async fn scheduler_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    let jobs = state.service.scheduler().jobs();
    Json(JobsResponse {
        total: jobs.len(),
        jobs,
    })
}

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ConnectResponse {
    auth_url: String,
}

pub async fn oauth_connect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<ConnectResponse>, AppError> {
    let platform = parse_platform(&platform)?;
    let auth_url = state.service.oauth().authorization_url(platform)?;
    Ok(Json(ConnectResponse { auth_url }))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Provider redirect target; always answers with a redirect to the dashboard
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> Redirect {
    let settings = format!(
        "{}/settings",
        state.service.config().server.frontend_url.trim_end_matches('/')
    );
    let fail = |code: &str| Redirect::to(&format!("{}?error={}", settings, code));

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(platform = %platform, error = %error, "provider denied authorization");
        return fail("access_denied");
    }

    let (Some(code), Some(oauth_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return fail("missing_params");
    };

    let Ok(platform) = platform.parse::<Platform>() else {
        return fail("not_configured");
    };

    match state.service.oauth().complete(platform, code, oauth_state).await {
        Ok(()) => Redirect::to(&format!("{}?connected={}", settings, platform)),
        Err(err) => {
            tracing::error!(platform = %platform, error = %err, "oauth callback failed");
            fail(err.redirect_code())
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    success: bool,
    message: String,
}

pub async fn oauth_disconnect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let platform = parse_platform(&platform)?;
    state.service.oauth().disconnect(platform).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("{} disconnected", platform),
    }))
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct PostResponse {
    success: bool,
    post: Post,
}

impl PostResponse {
    fn ok(post: Post) -> Json<Self> {
        Json(Self {
            success: true,
            post,
        })
    }
}

#[derive(Serialize)]
pub struct GenerateResponse {
    success: bool,
    post: Post,
    generation_result: libpostdeck::generation::GeneratedContent,
}

pub async fn generate_post(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GeneratePostRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let generated = state.service.posts().generate(request).await?;
    Ok(Json(GenerateResponse {
        success: true,
        post: generated.post,
        generation_result: generated.generation,
    }))
}

#[derive(Deserialize)]
pub struct ImageQuery {
    prompt: String,
}

#[derive(Serialize)]
pub struct ImageResponse {
    success: bool,
    image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    revised_prompt: Option<String>,
}

pub async fn generate_image(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ImageQuery>,
) -> Result<Json<ImageResponse>, AppError> {
    let image = state.service.posts().generate_image(&query.prompt).await?;
    Ok(Json(ImageResponse {
        success: true,
        image_url: image.image_url,
        revised_prompt: image.revised_prompt,
    }))
}

pub async fn create_post(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> Result<Json<PostResponse>, AppError> {
    let post = state.service.posts().create(request).await?;
    Ok(PostResponse::ok(post))
}

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<PostStatus>,
    content_type: Option<ContentType>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Serialize)]
pub struct ListResponse {
    posts: Vec<Post>,
    total: i64,
}

pub async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let defaults = PostFilter::default();
    let page = state
        .service
        .posts()
        .list(PostFilter {
            status: query.status,
            content_type: query.content_type,
            limit: query.limit.unwrap_or(defaults.limit),
            offset: query.offset.unwrap_or(defaults.offset),
        })
        .await?;

    Ok(Json(ListResponse {
        posts: page.posts,
        total: page.total,
    }))
}

#[derive(Serialize)]
pub struct GetPostResponse {
    post: Post,
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GetPostResponse>, AppError> {
    let post = state.service.posts().get(&id).await?;
    Ok(Json(GetPostResponse { post }))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<PostUpdate>,
) -> Result<Json<PostResponse>, AppError> {
    let post = state.service.posts().update(&id, update).await?;
    Ok(PostResponse::ok(post))
}

pub async fn approve_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PostResponse>, AppError> {
    let post = state.service.posts().approve(&id).await?;
    Ok(PostResponse::ok(post))
}

#[derive(Serialize)]
pub struct PublishResponse {
    success: bool,
    post: Post,
    platform_results: PublishResults,
}

pub async fn publish_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublishResponse>, AppError> {
    let report = state.service.publisher().publish(&id).await?;
    Ok(Json(PublishResponse {
        success: report.all_success,
        post: report.post,
        platform_results: report.results,
    }))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.service.posts().delete(&id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Post deleted".to_string(),
    }))
}
