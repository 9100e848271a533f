//! HTTP surface
//!
//! Thin axum wrapper around a shared [`ChainLog`]. The log is built once in
//! `main` and handed to every handler through router state.

pub mod routes;
pub mod threat;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::chain::ChainLog;

pub use threat::{ThreatKind, ThreatReport, ThreatValidationError};

#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<ChainLog>,
}

impl AppState {
    pub fn new(chain: ChainLog) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }
}

/// Build the service router with tracing and CORS layers
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(routes::health_check))
        .route("/chain", get(routes::get_chain))
        .route("/threat", post(routes::add_threat))
        .route("/verify", get(routes::verify_chain))
        .route("/reset", post(routes::reset_chain))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

/// `*` anywhere in the list allows any origin
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
