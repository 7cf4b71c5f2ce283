//! Router setup and configuration.

use axum::{
    Router,
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{health, id, logic};
use crate::api::middleware::auth::require_admin;
use crate::api::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    // Health and metrics routes (no auth required)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics));

    // Logic administration routes (admin auth required)
    let logic_routes = Router::new()
        .route(
            "/v1/logic",
            get(logic::list_logics).post(logic::create_logic),
        )
        .route(
            "/v1/logic/{slug}",
            get(logic::get_logic)
                .put(logic::update_logic)
                .delete(logic::delete_logic),
        )
        .route("/v1/logic/{slug}/activate", post(logic::activate_logic))
        .route("/v1/logic/{slug}/deactivate", post(logic::deactivate_logic))
        .route("/v1/logic/{slug}/allocations", get(logic::list_allocations))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // ID generation routes
    let id_routes = Router::new().route("/v1/id", get(id::generate_get).post(id::generate_post));

    Router::new()
        .merge(health_routes)
        .merge(logic_routes)
        .merge(id_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http",
                        method = %req.method(),
                        uri = %req.uri(),
                        request_id
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
