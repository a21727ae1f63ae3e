pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::{AlertListConfig, AuthConfig};
use crate::core::pipeline::Pipeline;
use crate::db::RuleStore;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub rule_store: Arc<dyn RuleStore>,
    pub auth: AuthConfig,
    pub limits: AlertListConfig,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Build the application router. `/api/*` sits behind basic auth;
/// `/health` and `/metrics` are open.
pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/api/transactions", post(handlers::create_transaction))
        .route("/api/alerts", get(handlers::list_alerts))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(api)
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}
