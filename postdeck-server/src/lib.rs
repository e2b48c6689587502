//! postdeck-server - HTTP API over the Postdeck service

use libpostdeck::PostdeckService;
use std::sync::Arc;

pub mod http;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PostdeckService>,
}

impl AppState {
    pub fn new(service: PostdeckService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
