//! Logic administration handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::state::AppState;
use crate::domain::{AllocationResponse, ApiResponse, LogicRequest, LogicResponse};
use crate::error::Result;

/// Query parameters for the allocation history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of entries (default: 50).
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const fn default_limit() -> u32 {
    50
}

/// Create a logic.
///
/// # Errors
///
/// Returns an error if the definition is invalid, the slug exists or storage fails.
pub async fn create_logic(
    State(state): State<AppState>,
    Json(request): Json<LogicRequest>,
) -> Result<Json<ApiResponse<LogicResponse>>> {
    let logic = state.logic_service.create(request).await?;
    Ok(Json(ApiResponse::success(logic.into())))
}

/// List logics.
///
/// # Errors
///
/// Returns an error if storage fails.
pub async fn list_logics(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LogicResponse>>>> {
    let logics = state.logic_service.list().await?;
    Ok(Json(ApiResponse::success(
        logics.into_iter().map(LogicResponse::from).collect(),
    )))
}

/// Get a logic.
///
/// # Errors
///
/// Returns an error if the logic does not exist or storage fails.
pub async fn get_logic(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<LogicResponse>>> {
    let logic = state.logic_service.get(&slug).await?;
    Ok(Json(ApiResponse::success(logic.into())))
}

/// Replace a logic's definition.
///
/// # Errors
///
/// Returns an error if the logic does not exist, the definition is invalid or
/// storage fails.
pub async fn update_logic(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<LogicRequest>,
) -> Result<Json<ApiResponse<LogicResponse>>> {
    let logic = state.logic_service.update(&slug, request).await?;
    Ok(Json(ApiResponse::success(logic.into())))
}

/// Soft-delete a logic.
///
/// # Errors
///
/// Returns an error if the logic does not exist or storage fails.
pub async fn delete_logic(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.logic_service.delete(&slug).await?;
    Ok(Json(ApiResponse::ok()))
}

/// Activate a logic.
///
/// # Errors
///
/// Returns an error if the logic does not exist or storage fails.
pub async fn activate_logic(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<LogicResponse>>> {
    let logic = state.logic_service.set_active(&slug, true).await?;
    Ok(Json(ApiResponse::success(logic.into())))
}

/// Deactivate a logic.
///
/// # Errors
///
/// Returns an error if the logic does not exist or storage fails.
pub async fn deactivate_logic(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<LogicResponse>>> {
    let logic = state.logic_service.set_active(&slug, false).await?;
    Ok(Json(ApiResponse::success(logic.into())))
}

/// Most recent allocations of a logic.
///
/// # Errors
///
/// Returns an error if the logic does not exist, the limit is out of range or
/// storage fails.
pub async fn list_allocations(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<AllocationResponse>>>> {
    let records = state.logic_service.allocations(&slug, query.limit).await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(AllocationResponse::from).collect(),
    )))
}
