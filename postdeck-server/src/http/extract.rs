//! Extractors that report malformed input as `{"error": ...}` with 400

use axum::extract::{FromRequest, FromRequestParts};

use crate::http::AppError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
