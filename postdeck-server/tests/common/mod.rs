#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

use libpostdeck::credentials::MemoryStore;
use libpostdeck::generation::OpenAiGenerator;
use libpostdeck::platforms::mock::MockPlatform;
use libpostdeck::service::ServiceParts;
use libpostdeck::{Config, Database, MultiPlatformPoster, Platform, PostdeckService};
use postdeck_server::{http, AppState};

pub const FRONTEND: &str = "http://dashboard.test";

// ---------------------------------------------------------------------------
// TestApp: one in-memory service per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub twitter_calls: Arc<AtomicUsize>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub async fn app() -> TestApp {
    TestApp::with_config(test_config()).await
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.frontend_url = FRONTEND.to_string();
    config
}

impl TestApp {
    /// Twitter posts succeed with id "tw-1"; LinkedIn is registered but not
    /// connected; Facebook and Instagram have no adapter at all.
    pub async fn with_config(config: Config) -> Self {
        let twitter = MockPlatform::success(Platform::Twitter, "tw-1");
        let twitter_calls = twitter.call_counter();

        let service = PostdeckService::from_parts(ServiceParts {
            db: Arc::new(Database::new(":memory:").await.expect("in-memory database")),
            credentials: Arc::new(MemoryStore::new()),
            poster: Arc::new(MultiPlatformPoster::new(vec![
                Arc::new(MockPlatform::disabled(Platform::LinkedIn)),
                Arc::new(twitter),
            ])),
            generator: Arc::new(OpenAiGenerator::new(&config.openai)),
            config,
        })
        .expect("service");

        let state = AppState::new(service);
        let router = http::router(state.clone());

        TestApp {
            router,
            state,
            twitter_calls,
        }
    }

    pub fn twitter_call_count(&self) -> usize {
        self.twitter_calls.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            location,
            body_bytes,
        }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request(Method::POST, path, None).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, None).await
    }

    /// Create a post through the API and return its id
    pub async fn create_post(&self, body: Value) -> String {
        let resp = self.post_json("/api/posts", body).await;
        assert_eq!(resp.status, StatusCode::OK, "create failed: {:?}", resp.json());
        resp.json()["post"]["id"].as_str().unwrap().to_string()
    }
}
