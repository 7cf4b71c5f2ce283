//! ID generation handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::api::state::AppState;
use crate::domain::{ApiResponse, GenerateRequest, Generated};
use crate::error::Result;

/// Query parameters for ID generation.
#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    /// Logic slug.
    #[serde(default)]
    pub slug: String,

    /// Number of IDs to generate (default: 1).
    #[serde(default)]
    pub count: Option<u32>,

    /// Explicit allocation date.
    #[serde(default)]
    pub date: Option<String>,
}

/// Generate identifiers without context data.
///
/// # Errors
///
/// Returns an error if the request is invalid or allocation fails.
pub async fn generate_get(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
) -> Result<Json<ApiResponse<Generated>>> {
    let generated = state
        .identifier_service
        .generate(&query.slug, None, query.date.as_deref(), query.count)
        .await?;

    Ok(Json(ApiResponse::success(generated)))
}

/// Generate identifiers with context data.
///
/// # Errors
///
/// Returns an error if the request is invalid or allocation fails.
pub async fn generate_post(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<Generated>>> {
    let generated = state
        .identifier_service
        .generate(
            &request.slug,
            Some(request.data),
            request.date.as_deref(),
            request.count,
        )
        .await?;

    Ok(Json(ApiResponse::success(generated)))
}
