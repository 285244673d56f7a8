use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use chronicle_core::AppError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let ingest_routes = Router::new()
        .route(
            "/api/internal/audit-records",
            post(handlers::ingest::record_audit_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_ingest_secret,
        ));

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/api/audit-logs",
            get(handlers::audit::list_audit_logs_handler),
        )
        .route(
            "/api/audit-logs/export",
            get(handlers::audit::export_audit_logs_handler),
        )
        .route(
            "/api/audit-logs/{id}",
            get(handlers::audit::get_audit_log_handler),
        )
        .merge(ingest_routes)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
