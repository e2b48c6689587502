//! Postdeck - social media post generation, approval, and publishing
//!
//! This library provides the post store, the platform adapters for LinkedIn,
//! Twitter/X, Facebook and Instagram, the multi-platform publisher, and the
//! due-post scheduler that the `postdeck-server` binary exposes over HTTP.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod generation;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod poster;
pub mod publisher;
pub mod scheduler;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialManager, CredentialStore, PlatformCredentials};
pub use db::Database;
pub use error::{PostdeckError, Result};
pub use poster::{MultiPlatformPoster, PublishResults};
pub use publisher::{PublishReport, Publisher};
pub use scheduler::Scheduler;
pub use service::PostdeckService;
pub use types::{ContentType, Platform, Post, PostFilter, PostResult, PostStatus, PostUpdate};
